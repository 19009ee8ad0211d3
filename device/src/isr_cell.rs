use core::{
    cell::{Cell, UnsafeCell},
    mem::MaybeUninit,
};

/// Static storage for state owned by interrupt handlers.
///
/// The value is written once from the main context while interrupts are disabled and only
/// accessed from interrupt handlers afterwards. Handlers running before that see nothing.
pub struct IsrCell<T> {
    ready: Cell<bool>,
    inner: UnsafeCell<MaybeUninit<T>>,
}

// `T: Sync` is not required since `UsbBusAllocator` is not `Sync`, and AVR interrupt handlers
// never preempt each other.
unsafe impl<T> Sync for IsrCell<T> {}

impl<T> IsrCell<T> {
    pub const fn new() -> Self {
        Self {
            ready: Cell::new(false),
            inner: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Stores the value. Must be called at most once, with interrupts disabled.
    #[allow(clippy::mut_from_ref)]
    pub fn init(&self, value: T) -> &mut T {
        let value = unsafe { (*self.inner.get()).write(value) };
        self.ready.set(true);
        value
    }

    /// Must only be called from interrupt handlers.
    #[allow(clippy::mut_from_ref)]
    pub fn get_mut(&self) -> Option<&mut T> {
        self.ready
            .get()
            .then(|| unsafe { (*self.inner.get()).assume_init_mut() })
    }
}
