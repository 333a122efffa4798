//! Application processor clock controller (APCC/APCS) for MSM8953 and SDM632.
//!
//! Each CPU cluster, and on the APCC variants the cache coherent interconnect,
//! is clocked by an RCG mux/divider. A mux/divider picks either the fixed
//! GPLL0 reference or a high frequency PLL (HFPLL) and divides it by a
//! half-integer. Clusters that hang off the same HFPLL form a sibling group:
//! the PLL is driven at the highest rate any of them asks for, and every
//! sibling is parked on GPLL0 while the PLL relocks.
//!
//! All clocks live in a [`ClockTree`] and are addressed by index
//! ([`MuxId`], [`PllId`]). The topology of each SoC is a static
//! [`TreeDesc`] selected by devicetree compatible string.

mod alpha_pll;
mod controller;
mod frac;
mod mmio;
mod mux_div;
mod negotiate;
mod notifier;
#[cfg(any(test, feature = "sim"))]
mod sim;
mod tree;
mod variant;

pub use self::{
    alpha_pll::{AlphaPll, AlphaPllConfig, AlphaPllDesc, PllFlavor, PllMode, PllRegs, UserCtl},
    controller::Apcc,
    frac::{div_in_range, div_rate, frac2_div_strict, recalc_rate, solve, GPLL_TOLERANCE},
    mmio::MmioRegmap,
    mux_div::{MuxDiv, MuxDivDesc, Parent},
    negotiate::{RateRequest, TolerancePolicy},
    notifier::{cci_target, Observer, Observers, RateEvent, CCI_FLOOR_HZ},
    tree::{ClkRef, ClockKind, ClockTree, MuxId, PllId, Source},
    variant::{TreeDesc, Variant},
};

#[cfg(any(test, feature = "sim"))]
pub use self::sim::SimRegmap;

use super::MHz;
use device::{Error, ErrorKind, Regmap};

/// Board crystal feeding every HFPLL
pub const XO_HZ: u64 = 19_200_000;
/// Rate of `gpll0_early` as left by the boot chain
pub const GPLL0_HZ: u64 = 800 * MHz;

/// Mux selector value for GPLL0
pub const GPLL_SEL: u32 = 4;
/// Mux selector value for the cluster HFPLL
pub const HFPLL_SEL: u32 = 5;

pub const APCC_CLK_C0: MuxId = MuxId(0);
pub const APCC_CLK_C1: MuxId = MuxId(1);
pub const APCC_CLK_CCI: MuxId = MuxId(2);

pub const APCC_CLK_HFPLL_C0: PllId = PllId(0);
pub const APCC_CLK_HFPLL_C1: PllId = PllId(1);
pub const APCC_CLK_HFPLL_CCI: PllId = PllId(2);

pub(crate) fn read<R: Regmap>(regmap: &mut R, offset: u32) -> Result<u32, ErrorKind> {
    regmap.read(offset).map_err(|e| e.kind())
}

pub(crate) fn write<R: Regmap>(regmap: &mut R, offset: u32, val: u32) -> Result<(), ErrorKind> {
    regmap.write(offset, val).map_err(|e| e.kind())
}

pub(crate) fn update_bits<R: Regmap>(
    regmap: &mut R,
    offset: u32,
    mask: u32,
    val: u32,
) -> Result<(), ErrorKind> {
    regmap.update_bits(offset, mask, val).map_err(|e| e.kind())
}
