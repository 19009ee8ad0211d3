use std::time::Duration;

use anyhow::{Context as _, anyhow, bail};
use rusb::{
    Context, Device as RusbDevice, DeviceHandle, Direction, LogLevel, TransferType, UsbContext,
};
use shared::{REPORT_LEN, USB_MANUFACTURER, USB_PID, USB_PRODUCT, USB_VID};
use tracing::instrument;

use crate::{AnyResult, channel::Transport, exactly_one::ExactlyOneIter};

/// The configuration channel of a device booted in programming mode, reached through libusb.
#[derive(Debug)]
pub struct Device {
    handle: DeviceHandle<Context>,
    interface_number: u8,
    in_endpoint_address: u8,
    out_endpoint_address: u8,
    timeout: Duration,
}

impl Device {
    /// Finds the single attached device in programming mode and claims its HID interface.
    ///
    /// # Errors
    /// Returns an error if there is not exactly one such device or it cannot be claimed.
    #[instrument(err(Debug))]
    pub fn open(timeout: Duration) -> AnyResult<Self> {
        let mut context = Context::new().context("unable to initialize libusb")?;
        context.set_log_level(LogLevel::Warning);

        let handle = context
            .devices()?
            .iter()
            .filter_map(Self::device_filter)
            .exactly_one()
            .map_err(|e| anyhow!("{e}"))
            .context("opening device")?;

        let device = handle.device();
        let device_desc = device.device_descriptor().context("device descriptor")?;

        let config_desc = (0..device_desc.num_configurations())
            .filter_map(|i| device.config_descriptor(i).ok())
            .exactly_one()
            .map_err(|err| anyhow!("{err}"))
            .context("config descriptor")?;

        let config_number = config_desc.number();

        let interface_desc = config_desc
            .interfaces()
            .flat_map(|i| i.descriptors())
            .exactly_one()
            .map_err(|err| anyhow!("{err}"))
            .context("interface descriptor")?;

        let interface_number = interface_desc.interface_number();
        let setting_number = interface_desc.setting_number();

        let endpoint = |direction| {
            interface_desc
                .endpoint_descriptors()
                .filter(|edesc| edesc.direction() == direction)
                .filter(|edesc| edesc.transfer_type() == TransferType::Interrupt)
                .exactly_one()
                .map(|edesc| edesc.address())
                .map_err(|err| anyhow!("{err}"))
        };

        let in_endpoint_address = endpoint(Direction::In).context("IN interrupt endpoint")?;
        let out_endpoint_address = endpoint(Direction::Out).context("OUT interrupt endpoint")?;

        if handle.kernel_driver_active(interface_number)? {
            handle.detach_kernel_driver(interface_number)?;
        }

        handle
            .set_active_configuration(config_number)
            .context("setting config number")?;

        handle
            .claim_interface(interface_number)
            .context("claiming interface")?;

        handle
            .set_alternate_setting(interface_number, setting_number)
            .context("choosing alternate setting")?;

        tracing::debug!(
            "claimed interface {interface_number}, IN {in_endpoint_address:#04x}, \
             OUT {out_endpoint_address:#04x}"
        );

        Ok(Self {
            handle,
            interface_number,
            in_endpoint_address,
            out_endpoint_address,
            timeout,
        })
    }

    #[expect(clippy::needless_pass_by_value, reason = "used in a `filter_map`")]
    fn device_filter(device: RusbDevice<Context>) -> Option<DeviceHandle<Context>> {
        let desc = device.device_descriptor().ok()?;

        if desc.vendor_id() != USB_VID || desc.product_id() != USB_PID {
            return None;
        }

        let handle = device.open().ok()?;
        let manufacturer = handle.read_manufacturer_string_ascii(&desc).ok()?;
        let product = handle.read_product_string_ascii(&desc).ok()?;

        if manufacturer != USB_MANUFACTURER || product != USB_PRODUCT {
            return None;
        }

        Some(handle)
    }
}

impl Transport for Device {
    fn send(&mut self, report: &[u8; REPORT_LEN]) -> AnyResult<()> {
        let written = self
            .handle
            .write_interrupt(self.out_endpoint_address, report, self.timeout)
            .context("sending request")?;

        if written != REPORT_LEN {
            bail!("short write, {written} of {REPORT_LEN} bytes sent");
        }

        Ok(())
    }

    fn receive(&mut self) -> AnyResult<[u8; REPORT_LEN]> {
        let mut report = [0; REPORT_LEN];
        let read = self
            .handle
            .read_interrupt(self.in_endpoint_address, &mut report, self.timeout)
            .context("waiting for response")?;

        if read != REPORT_LEN {
            bail!("short read, {read} of {REPORT_LEN} bytes received");
        }

        Ok(report)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.handle.release_interface(self.interface_number).ok();

        if let Ok(false) = self.handle.kernel_driver_active(self.interface_number) {
            self.handle.attach_kernel_driver(self.interface_number).ok();
        }
    }
}
