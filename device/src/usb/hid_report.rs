use shared::ReportData;
use usbd_hid::descriptor::{gen_hid_descriptor, generator_prelude::*};

/// Relative pointer report with 16-bit axes, a wheel and horizontal panning.
#[gen_hid_descriptor(
    (collection = APPLICATION, usage_page = GENERIC_DESKTOP, usage = MOUSE) = {
        (collection = PHYSICAL, usage = POINTER) = {
            (usage_page = BUTTON, usage_min = BUTTON_1, usage_max = BUTTON_8) = {
                #[packed_bits 8] #[item_settings data,variable,absolute] buttons=input;
            };
            (usage_page = GENERIC_DESKTOP,) = {
                (usage = X,) = {
                    #[item_settings data,variable,relative] x=input;
                };
                (usage = Y,) = {
                    #[item_settings data,variable,relative] y=input;
                };
                (usage = WHEEL,) = {
                    #[item_settings data,variable,relative] wheel=input;
                };
            };
            (usage_page = CONSUMER,) = {
                (usage = AC_PAN,) = {
                    #[item_settings data,variable,relative] pan=input;
                };
            };
        };
    }
)]
#[derive(Clone, Copy, Debug, Default)]
pub struct PointerReport {
    buttons: u8,
    x: i16,
    y: i16,
    wheel: i8,
    pan: i8,
}

impl From<ReportData> for PointerReport {
    fn from(value: ReportData) -> Self {
        Self {
            buttons: value.buttons,
            x: value.x,
            y: value.y,
            wheel: value.wheel,
            pan: value.pan,
        }
    }
}

/// Configuration channel report.
///
/// Both directions carry a raw 64-byte [`shared::ConfigRequest`] or [`shared::ConfigResponse`].
#[gen_hid_descriptor(
    (collection = APPLICATION, usage_page = VENDOR_DEFINED_START, usage = 0x01) = {
        (usage = 0x02, logical_min = 0x0) = {
            #[item_settings data,variable,absolute] response=input;
        };
        (usage = 0x03, logical_min = 0x0) = {
            #[item_settings data,variable,absolute] request=output;
        };
    }
)]
#[derive(Clone, Copy, Debug)]
pub struct ConfigReport {
    response: [u8; 64],
    request: [u8; 64],
}
