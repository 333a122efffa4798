//! 32-bit MMIO accessors, after <arch/arm/include/asm/io.h>

use core::ptr::{read_volatile, write_volatile};
use core::sync::atomic::{fence, Ordering};

fn _raw_readl(a: usize) -> u32 {
    unsafe { read_volatile::<u32>(a as *const u32) }
}

fn _raw_writel(v: u32, a: usize) {
    unsafe { write_volatile::<u32>(a as *mut u32, v) }
}

/// Registers are little endian; convert to the CPU's byte order
fn readl_relaxed(c: usize) -> u32 {
    u32::from_le(_raw_readl(c))
}

fn writel_relaxed(v: u32, c: usize) {
    _raw_writel(v.to_le(), c);
}

/// Order all earlier register accesses before any later ones
pub fn mb() {
    fence(Ordering::SeqCst);
}

/// Read a 32-bit register
///
/// # Safety
///
/// `c` must be the address of a mapped, 4-byte aligned register.
pub unsafe fn readl(c: usize) -> u32 {
    let v = readl_relaxed(c);
    mb();
    v
}

/// Write a 32-bit register
///
/// # Safety
///
/// `c` must be the address of a mapped, 4-byte aligned register.
pub unsafe fn writel(v: u32, c: usize) {
    mb();
    writel_relaxed(v, c);
}
