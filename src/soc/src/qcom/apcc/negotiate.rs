use super::{
    frac::{div_rate, solve, GPLL_TOLERANCE},
    tree::ClkRef,
    ClockTree, MuxId, PllId, RateEvent, Source,
};
use device::{ErrorKind, Regmap};
use log::{debug, warn};

/// Remainder allowed when a rate is programmed onto an already chosen parent
///
/// The historical driver computes this as `5000 ? src == gpll : 0`, which
/// evaluates to 1 on GPLL0 and 0 otherwise. Whether 5000 was meant is not
/// settled, so both are available.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TolerancePolicy {
    /// 5000 on GPLL0, exact on an HFPLL; matches the tolerance used while
    /// negotiating
    #[default]
    GpllSlack,
    /// 1 on GPLL0, exact on an HFPLL
    Literal,
}

impl TolerancePolicy {
    pub fn set_rate_tolerance(self, on_gpll: bool) -> u64 {
        match self {
            Self::GpllSlack if on_gpll => GPLL_TOLERANCE,
            Self::Literal if on_gpll => 1,
            _ => 0,
        }
    }
}

/// Outcome of rate negotiation for one mux/divider
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RateRequest {
    /// Rate the mux will actually produce
    pub rate: u64,
    pub parent: Source,
    /// Position of `parent` in the mux's parent map
    pub parent_index: usize,
    /// Rate `parent` has to run at
    pub parent_rate: u64,
    /// Twice the divisor
    pub div: u32,
}

impl<R: Regmap> ClockTree<R> {
    /// Highest rate requested by the muxes other than `id` running from `pll`
    fn sibling_demand(&self, id: MuxId, pll: PllId) -> u64 {
        self.muxes()
            .filter(|(other, md)| *other != id && md.source() == Some(Source::Hfpll(pll)))
            .map(|(_, md)| md.freq())
            .max()
            .unwrap_or(0)
    }

    /// Pick a parent and divider for `rate`
    ///
    /// GPLL0 is tried first, allowing a small remainder since nothing else is
    /// disturbed. Otherwise the HFPLL is driven at the highest rate any of its
    /// siblings needs, and `rate` must divide from that exactly.
    pub fn determine_rate(&self, id: MuxId, rate: u64) -> Result<RateRequest, ErrorKind> {
        let md = self.mux(id)?;
        if rate == 0 {
            return Err(ErrorKind::Unsatisfiable);
        }

        if let Some((parent_index, _)) = md.find_parent(Source::Gpll) {
            let prate = self.gpll_rate;
            if let Some(div) = solve(prate, rate, GPLL_TOLERANCE) {
                return Ok(RateRequest {
                    rate: div_rate(prate, div),
                    parent: Source::Gpll,
                    parent_index,
                    parent_rate: prate,
                    div,
                });
            }
        }

        let Some((parent_index, parent)) = md.pll_parent() else {
            debug!("{}: {} Hz not reachable from gpll", md.name(), rate);
            return Err(ErrorKind::Unsatisfiable);
        };
        let Source::Hfpll(pll) = parent else {
            return Err(ErrorKind::NoParent);
        };

        let target = self.sibling_demand(id, pll).max(rate);
        let (prate, _, _) = self.pll(pll)?.round_rate(target, self.xo_rate)?;
        let Some(div) = solve(prate, rate, 0) else {
            debug!("{}: no valid divider for {} Hz from {} Hz", md.name(), rate, prate);
            return Err(ErrorKind::Unsatisfiable);
        };

        Ok(RateRequest {
            rate: div_rate(prate, div),
            parent,
            parent_index,
            parent_rate: prate,
            div,
        })
    }

    /// Set a new rate for a mux/divider
    ///
    /// Negotiates a parent, moves the HFPLL when needed (parking its other
    /// users), then programs the mux. Returns the rate actually produced.
    /// On failure the mux keeps its previous configuration.
    ///
    /// Other users of the HFPLL keep their cached divider across the move,
    /// so a sibling can end up below its requested rate when the PLL is
    /// retuned downwards.
    pub fn set_rate(&mut self, id: MuxId, rate: u64) -> Result<u64, ErrorKind> {
        let req = self.determine_rate(id, rate)?;
        debug!("{}: {} Hz -> {:?}", self.mux(id)?.name(), rate, req);

        if let Err(e) = self.notify(ClkRef::Mux(id), RateEvent::Pre) {
            warn!("{}: pre-change observer failed: {}", self.mux(id)?.name(), e);
        }

        if let Err(e) = self.change_rate(id, &req) {
            if let Err(abort) = self.notify(ClkRef::Mux(id), RateEvent::Abort) {
                warn!("{}: abort observer failed: {}", self.mux(id)?.name(), abort);
            }
            return Err(e);
        }

        if let Err(e) = self.notify(ClkRef::Mux(id), RateEvent::Post) {
            warn!("{}: post-change observer failed: {}", self.mux(id)?.name(), e);
        }
        Ok(req.rate)
    }

    fn change_rate(&mut self, id: MuxId, req: &RateRequest) -> Result<(), ErrorKind> {
        if let Source::Hfpll(pll) = req.parent {
            let running = self.pll(pll)?;
            if running.rate() != req.parent_rate || running.is_faulted() {
                self.set_pll_rate(pll, req.parent_rate)?;
            }
        }

        let (src, _) = self.read_source_divider(id)?;
        if self.mux(id)?.parent_index(src) == Some(req.parent_index) {
            self.mux_set_rate(id, req.rate, req.parent_rate)
        } else {
            self.mux_set_rate_and_parent(id, req.rate, req.parent_rate, req.parent_index)
        }
    }

    /// Program `rate` on the parent the mux is using now
    pub(crate) fn mux_set_rate(&mut self, id: MuxId, rate: u64, prate: u64) -> Result<(), ErrorKind> {
        let (src, _) = self.read_source_divider(id)?;
        self.program_rate(id, src, rate, prate)
    }

    /// Program `rate` on the parent at `index` of the parent map
    pub(crate) fn mux_set_rate_and_parent(
        &mut self,
        id: MuxId,
        rate: u64,
        prate: u64,
        index: usize,
    ) -> Result<(), ErrorKind> {
        let src = self
            .mux(id)?
            .desc()
            .parent_map
            .get(index)
            .ok_or(ErrorKind::NoParent)?
            .sel;
        self.program_rate(id, src, rate, prate)
    }

    fn program_rate(&mut self, id: MuxId, src: u32, rate: u64, prate: u64) -> Result<(), ErrorKind> {
        let policy = self.policy;
        let md = self.muxes.get_mut(id.0).ok_or(ErrorKind::InvalidClock)?;
        let on_gpll = md.source_of(src) == Some(Source::Gpll);
        let tolerance = policy.set_rate_tolerance(on_gpll);

        let Some(div) = solve(prate, rate, tolerance) else {
            debug!("{}: {} Hz does not divide from {} Hz", md.name(), rate, prate);
            return Err(ErrorKind::Unsatisfiable);
        };

        md.set_src_div_cache(&mut self.regmap, src, div - 1)?;
        md.set_freq(rate);
        Ok(())
    }
}
