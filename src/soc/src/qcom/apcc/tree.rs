use super::{
    alpha_pll::AlphaPll, frac::recalc_rate, mux_div::MuxDiv, negotiate::TolerancePolicy, Observer,
    RateEvent, Variant, XO_HZ,
};
use device::{ErrorKind, Regmap};
use log::{debug, warn};

/// Upper bound on mux/dividers in one controller
pub const MAX_MUXES: usize = 3;
/// Upper bound on HFPLLs in one controller
pub const MAX_PLLS: usize = 3;

/// Index of a mux/divider in its [`ClockTree`]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MuxId(pub usize);

/// Index of an HFPLL in its [`ClockTree`]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PllId(pub usize);

/// Kind of upstream reference a mux can select
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClockKind {
    /// GPLL class: rate set by the boot chain, never changed here
    FixedReference,
    /// HFPLL class: retuned for every CPU frequency request
    SharedVariable,
}

/// An upstream reference of a mux/divider
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Source {
    Gpll,
    Hfpll(PllId),
}

impl Source {
    pub fn kind(&self) -> ClockKind {
        match self {
            Self::Gpll => ClockKind::FixedReference,
            Self::Hfpll(_) => ClockKind::SharedVariable,
        }
    }
}

/// Any clock observers can be attached to
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClkRef {
    Mux(MuxId),
    Pll(PllId),
}

/// All clocks of one controller and the registers behind them
pub struct ClockTree<R> {
    pub(crate) regmap: R,
    pub(crate) variant: Variant,
    pub(crate) gpll_rate: u64,
    pub(crate) xo_rate: u64,
    pub(crate) policy: TolerancePolicy,
    pub(crate) muxes: heapless::Vec<MuxDiv, MAX_MUXES>,
    pub(crate) plls: heapless::Vec<AlphaPll, MAX_PLLS>,
}

impl<R: Regmap> ClockTree<R> {
    /// Build the clocks of `variant` without touching the hardware
    ///
    /// `gpll_rate` is the rate GPLL0 was left at by the boot chain. Call
    /// [`ClockTree::probe`] to bring the hardware into a known state.
    pub fn new(regmap: R, variant: Variant, gpll_rate: u64, policy: TolerancePolicy) -> Self {
        let desc = variant.desc();
        let mut muxes = heapless::Vec::new();
        for md in desc.muxes.iter().take(MAX_MUXES) {
            // bounded by take()
            let _ = muxes.push(MuxDiv::new(md));
        }
        let mut plls = heapless::Vec::new();
        for pll in desc.plls.iter().take(MAX_PLLS) {
            let _ = plls.push(AlphaPll::new(pll));
        }

        Self {
            regmap,
            variant,
            gpll_rate,
            xo_rate: XO_HZ,
            policy,
            muxes,
            plls,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn policy(&self) -> TolerancePolicy {
        self.policy
    }

    pub fn regmap(&self) -> &R {
        &self.regmap
    }

    pub fn regmap_mut(&mut self) -> &mut R {
        &mut self.regmap
    }

    pub fn into_regmap(self) -> R {
        self.regmap
    }

    pub fn muxes(&self) -> impl Iterator<Item = (MuxId, &MuxDiv)> {
        self.muxes.iter().enumerate().map(|(i, md)| (MuxId(i), md))
    }

    pub fn plls(&self) -> impl Iterator<Item = (PllId, &AlphaPll)> {
        self.plls.iter().enumerate().map(|(i, pll)| (PllId(i), pll))
    }

    pub fn mux(&self, id: MuxId) -> Result<&MuxDiv, ErrorKind> {
        self.muxes.get(id.0).ok_or(ErrorKind::InvalidClock)
    }

    pub(crate) fn mux_mut(&mut self, id: MuxId) -> Result<&mut MuxDiv, ErrorKind> {
        self.muxes.get_mut(id.0).ok_or(ErrorKind::InvalidClock)
    }

    pub fn pll(&self, id: PllId) -> Result<&AlphaPll, ErrorKind> {
        self.plls.get(id.0).ok_or(ErrorKind::InvalidClock)
    }

    pub(crate) fn pll_mut(&mut self, id: PllId) -> Result<&mut AlphaPll, ErrorKind> {
        self.plls.get_mut(id.0).ok_or(ErrorKind::InvalidClock)
    }

    /// Current rate of an upstream source
    pub fn read_rate(&self, source: Source) -> Result<u64, ErrorKind> {
        match source {
            Source::Gpll => Ok(self.gpll_rate),
            Source::Hfpll(id) => Ok(self.pll(id)?.rate()),
        }
    }

    /// Program a mux/divider directly and cache the configuration
    ///
    /// `div` is the raw field value, `2 * divisor - 1`. The resulting output
    /// rate is recorded as the requested rate, so an HFPLL parent is not
    /// later retuned below it.
    pub fn write_source_divider(&mut self, id: MuxId, src: u32, div: u32) -> Result<(), ErrorKind> {
        if !(1..=31).contains(&div) {
            return Err(ErrorKind::OutOfRange);
        }
        let md = self.muxes.get_mut(id.0).ok_or(ErrorKind::InvalidClock)?;
        if md.source_of(src).is_none() {
            return Err(ErrorKind::NoParent);
        }
        md.set_src_div_cache(&mut self.regmap, src, div)?;

        let rate = self.rate(id)?;
        self.mux_mut(id)?.set_freq(rate);
        Ok(())
    }

    /// Hardware `(src, div)` of a mux/divider, with a zero divider read as 1
    pub fn read_source_divider(&mut self, id: MuxId) -> Result<(u32, u32), ErrorKind> {
        let md = self.muxes.get(id.0).ok_or(ErrorKind::InvalidClock)?;
        md.get_src_div(&mut self.regmap)
    }

    /// Attach `observer` to the rate changes of `clk`
    ///
    /// Observers run in registration order.
    pub fn on_rate_change(&mut self, clk: ClkRef, observer: Observer) -> Result<(), ErrorKind> {
        let nb = match clk {
            ClkRef::Mux(id) => &mut self.mux_mut(id)?.nb,
            ClkRef::Pll(id) => &mut self.pll_mut(id)?.nb,
        };
        nb.push(observer).map_err(|_| ErrorKind::OutOfRange)
    }

    /// Output rate of a mux/divider as the hardware is programmed now
    pub fn rate(&mut self, id: MuxId) -> Result<u64, ErrorKind> {
        let (src, div) = self.read_source_divider(id)?;
        let source = self.mux(id)?.source_of(src).ok_or(ErrorKind::NoParent)?;
        Ok(recalc_rate(self.read_rate(source)?, div))
    }

    /// Last rate successfully requested for a mux/divider
    pub fn requested_rate(&self, id: MuxId) -> Result<u64, ErrorKind> {
        Ok(self.mux(id)?.freq())
    }

    pub fn enable(&mut self, id: MuxId) -> Result<(), ErrorKind> {
        let md = self.muxes.get(id.0).ok_or(ErrorKind::InvalidClock)?;
        md.enable(&mut self.regmap)
    }

    pub fn disable(&mut self, id: MuxId) -> Result<(), ErrorKind> {
        let md = self.muxes.get(id.0).ok_or(ErrorKind::InvalidClock)?;
        md.disable(&mut self.regmap)
    }

    pub fn is_enabled(&mut self, id: MuxId) -> Result<bool, ErrorKind> {
        let md = self.muxes.get(id.0).ok_or(ErrorKind::InvalidClock)?;
        md.is_enabled(&mut self.regmap)
    }

    /// Move an HFPLL to `rate`
    ///
    /// Observers of the PLL are told before the L/alpha write and after the
    /// PLL has relocked. If an observer refuses the change, or the PLL cannot
    /// be reprogrammed, the observers already told are sent
    /// [`RateEvent::Abort`], or [`RateEvent::Fault`] when the PLL did not
    /// relock on its previous rate either. Once the PLL has moved, failing
    /// `Post` observers are only logged; their muxes stay parked on GPLL0.
    pub fn set_pll_rate(&mut self, id: PllId, rate: u64) -> Result<u64, ErrorKind> {
        let xo = self.xo_rate;
        let pll = self.pll(id)?;
        let (rounded, _, _) = pll.round_rate(rate, xo)?;
        if rounded == pll.rate() && !pll.is_faulted() {
            return Ok(rounded);
        }

        debug!("{}: {} -> {} Hz", pll.name(), pll.rate(), rounded);
        self.notify(ClkRef::Pll(id), RateEvent::Pre)?;

        let pll = self.plls.get_mut(id.0).ok_or(ErrorKind::InvalidClock)?;
        if let Err(e) = pll.program_rate(&mut self.regmap, rounded, xo) {
            warn!("{}: rate change failed: {}", pll.name(), e);
            let event = if pll.is_faulted() {
                RateEvent::Fault
            } else {
                RateEvent::Abort
            };
            if let Err(n) = self.notify(ClkRef::Pll(id), event) {
                warn!("{:?} notification failed: {}", event, n);
            }
            return Err(e);
        }

        if let Err(e) = self.notify(ClkRef::Pll(id), RateEvent::Post) {
            warn!("{}: post-change observer failed: {}", self.pll(id)?.name(), e);
        }
        Ok(rounded)
    }

    pub fn enable_pll(&mut self, id: PllId) -> Result<(), ErrorKind> {
        let pll = self.plls.get_mut(id.0).ok_or(ErrorKind::InvalidClock)?;
        pll.enable(&mut self.regmap)
    }

    pub fn disable_pll(&mut self, id: PllId) -> Result<(), ErrorKind> {
        let pll = self.plls.get_mut(id.0).ok_or(ErrorKind::InvalidClock)?;
        pll.disable(&mut self.regmap)
    }

    /// HFPLL rate according to its L/alpha registers
    pub fn recalc_pll_rate(&mut self, id: PllId) -> Result<u64, ErrorKind> {
        let xo = self.xo_rate;
        let pll = self.plls.get(id.0).ok_or(ErrorKind::InvalidClock)?;
        pll.recalc_rate(&mut self.regmap, xo)
    }
}
