//! Numeric-processor state isolation.
//!
//! Host code may be in the middle of a floating-point computation when one of
//! its input hooks fires, and the host may rely on non-default rounding or
//! precision settings. Anything the Lua runtime does while servicing a callback
//! must not leak those settings back, so each dispatched callback runs inside a
//! [`NumericStateGuard`] that captures the control state up front and puts it
//! back when dropped, including while unwinding.

/// Platform floating-point control state.
pub trait NumericState: Sized {
    /// Snapshot the current state.
    fn capture() -> Self;

    /// Reinstate a previously captured snapshot.
    fn restore(&self);
}

/// Nothing to save on targets without a known control register layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoNumericState;

impl NumericState for NoNumericState {
    fn capture() -> Self {
        Self
    }

    fn restore(&self) {}
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use x86::X86NumericState;

/// The state type used by [`isolated`] on this target.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub type PlatformNumericState = X86NumericState;

/// The state type used by [`isolated`] on this target.
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub type PlatformNumericState = NoNumericState;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[allow(unsafe_code)]
pub(crate) mod x86 {
    use super::NumericState;
    use std::arch::asm;

    /// SSE control/status register plus the x87 control word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct X86NumericState {
        pub mxcsr: u32,
        pub x87_control: u16,
    }

    pub(crate) fn read_mxcsr() -> u32 {
        let mut value = 0u32;
        // SAFETY: stmxcsr only stores the register into the given location.
        unsafe {
            asm!("stmxcsr [{}]", in(reg) &raw mut value, options(nostack, preserves_flags));
        }
        value
    }

    pub(crate) fn write_mxcsr(value: u32) {
        // SAFETY: reserved bits are never set by callers (values come from
        // stmxcsr or differ only in rounding/mask bits).
        unsafe {
            asm!("ldmxcsr [{}]", in(reg) &raw const value, options(nostack, preserves_flags, readonly));
        }
    }

    fn read_x87_control() -> u16 {
        let mut value = 0u16;
        // SAFETY: fnstcw only stores the control word into the given location.
        unsafe {
            asm!("fnstcw [{}]", in(reg) &raw mut value, options(nostack, preserves_flags));
        }
        value
    }

    fn write_x87_control(value: u16) {
        // SAFETY: the value was produced by fnstcw.
        unsafe {
            asm!("fldcw [{}]", in(reg) &raw const value, options(nostack, preserves_flags, readonly));
        }
    }

    impl NumericState for X86NumericState {
        fn capture() -> Self {
            Self {
                mxcsr: read_mxcsr(),
                x87_control: read_x87_control(),
            }
        }

        fn restore(&self) {
            write_mxcsr(self.mxcsr);
            write_x87_control(self.x87_control);
        }
    }
}

/// Restores the captured numeric state when dropped.
#[must_use = "the state is restored when the guard is dropped"]
pub struct NumericStateGuard<S: NumericState = PlatformNumericState> {
    saved: S,
}

impl<S: NumericState> NumericStateGuard<S> {
    pub fn new() -> Self {
        Self { saved: S::capture() }
    }

    pub fn saved(&self) -> &S {
        &self.saved
    }
}

impl<S: NumericState> Default for NumericStateGuard<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: NumericState> Drop for NumericStateGuard<S> {
    fn drop(&mut self) {
        self.saved.restore();
    }
}

/// Run `f` with the platform numeric state saved before and restored after.
pub fn isolated<R>(f: impl FnOnce() -> R) -> R {
    let _guard = NumericStateGuard::<PlatformNumericState>::new();
    f()
}
