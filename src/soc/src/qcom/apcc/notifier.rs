//! Rate-change observers.
//!
//! Observers hang off the clock whose rate they care about and are run
//! synchronously, in registration order, by the code changing that rate.
//!
//! A [`Observer::ReparentGuard`] sits on an HFPLL for every mux/divider that
//! can select it. Before the PLL moves, a mux running from it is parked on
//! GPLL0 at divide-by-one; once the PLL has relocked the mux gets its cached
//! source and divider back. A CPU never sees the PLL mid-transition. When the
//! PLL could not be relocked at all the mux stays parked, and its parked
//! configuration becomes the one remembered.
//!
//! A [`Observer::CciTracker`] sits on both cluster muxes and keeps the CCI at
//! two fifths of the cluster rate.

use super::{frac::recalc_rate, tree::ClkRef, ClockTree, MuxId, PllId, Source, MHz};
use device::{ErrorKind, Regmap};
use log::{debug, warn};

pub const MAX_OBSERVERS: usize = 4;

/// Lowest rate the CCI is run at
pub const CCI_FLOOR_HZ: u64 = 320 * MHz;

pub type Observers = heapless::Vec<Observer, MAX_OBSERVERS>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RateEvent {
    /// The rate is about to change
    Pre,
    /// The rate has changed
    Post,
    /// A change announced with `Pre` did not happen
    Abort,
    /// A change announced with `Pre` failed and left the clock without a
    /// usable output
    Fault,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Observer {
    /// Park `mux` on GPLL0 while `pll` changes rate
    ReparentGuard { mux: MuxId, pll: PllId },
    /// Derive the rate of `cci` from the two cluster muxes
    CciTracker { cci: MuxId, clusters: [MuxId; 2] },
}

/// CCI rate for cluster rates `c0` and `c1`
///
/// Ahead of a cluster change the CCI follows the slower cluster, after it the
/// faster one. Nothing is requested on abort or fault.
pub fn cci_target(c0: u64, c1: u64, event: RateEvent) -> Option<u64> {
    let rate = match event {
        RateEvent::Pre => c0.min(c1),
        RateEvent::Post => c0.max(c1),
        RateEvent::Abort | RateEvent::Fault => return None,
    };
    Some((rate * 2 / 5).max(CCI_FLOOR_HZ))
}

impl<R: Regmap> ClockTree<R> {
    /// Run the observers of `clk`
    ///
    /// A failing `Pre` observer stops the walk; every observer already run,
    /// the failing one included, then gets [`RateEvent::Abort`]. Other events
    /// always run every observer and report the first failure.
    pub(crate) fn notify(&mut self, clk: ClkRef, event: RateEvent) -> Result<(), ErrorKind> {
        let observers = match clk {
            ClkRef::Mux(id) => self.mux(id)?.nb.clone(),
            ClkRef::Pll(id) => self.pll(id)?.nb.clone(),
        };

        let mut result = Ok(());
        for (i, observer) in observers.iter().enumerate() {
            if let Err(e) = self.call(*observer, event) {
                warn!("{:?}: {:?} observer {:?} failed: {}", clk, event, observer, e);
                if event == RateEvent::Pre {
                    for done in &observers[..=i] {
                        if let Err(abort) = self.call(*done, RateEvent::Abort) {
                            warn!("{:?}: abort of {:?} failed: {}", clk, done, abort);
                        }
                    }
                    return Err(e);
                }
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    fn call(&mut self, observer: Observer, event: RateEvent) -> Result<(), ErrorKind> {
        match observer {
            Observer::ReparentGuard { mux, pll } => self.reparent_guard(mux, pll, event),
            Observer::CciTracker { cci, clusters } => self.cci_follow(cci, clusters, event),
        }
    }

    fn reparent_guard(&mut self, id: MuxId, pll: PllId, event: RateEvent) -> Result<(), ErrorKind> {
        let md = self.muxes.get(id.0).ok_or(ErrorKind::InvalidClock)?;
        let (src, div) = md.get_src_div(&mut self.regmap)?;

        match event {
            RateEvent::Pre => {
                if md.source_of(src) != Some(Source::Hfpll(pll)) {
                    return Ok(());
                }
                let Some((_, gpll)) = md.find_parent(Source::Gpll) else {
                    warn!("{}: no safe parent to park on", md.name());
                    return Ok(());
                };
                debug!("{}: park on gpll", md.name());
                md.set_src_div(&mut self.regmap, gpll, 1)
            }
            RateEvent::Post | RateEvent::Abort => {
                if (src, div) == (md.src(), md.div()) {
                    return Ok(());
                }
                debug!("{}: restore src {} div {}", md.name(), md.src(), md.div());
                if let Err(e) = md.set_src_div(&mut self.regmap, md.src(), md.div()) {
                    self.keep_parked(id)?;
                    return Err(e);
                }

                let md = self.mux(id)?;
                if event == RateEvent::Post && md.source() == Some(Source::Hfpll(pll)) {
                    let rate = md.recalc_rate(self.pll(pll)?.rate());
                    if rate < md.freq() {
                        warn!(
                            "{}: runs at {} Hz, below the {} Hz asked for",
                            md.name(),
                            rate,
                            md.freq()
                        );
                    }
                }
                Ok(())
            }
            RateEvent::Fault => {
                if md.source() != Some(Source::Hfpll(pll)) {
                    return Ok(());
                }
                self.keep_parked(id)
            }
        }
    }

    /// Make the configuration a mux is parked at the one it keeps
    ///
    /// Does nothing unless the hardware runs the mux from GPLL0.
    fn keep_parked(&mut self, id: MuxId) -> Result<(), ErrorKind> {
        let gpll_rate = self.gpll_rate;
        let md = self.muxes.get_mut(id.0).ok_or(ErrorKind::InvalidClock)?;
        let (src, div) = md.get_src_div(&mut self.regmap)?;
        if md.source_of(src) != Some(Source::Gpll) {
            return Ok(());
        }
        warn!("{}: stays on gpll", md.name());
        md.adopt(src, div, recalc_rate(gpll_rate, div));
        Ok(())
    }

    fn cci_follow(&mut self, cci: MuxId, clusters: [MuxId; 2], event: RateEvent) -> Result<(), ErrorKind> {
        let c0 = self.rate(clusters[0])?;
        let c1 = self.rate(clusters[1])?;
        let Some(rate) = cci_target(c0, c1, event) else {
            return Ok(());
        };
        debug!("{}: follow clusters at {} Hz", self.mux(cci)?.name(), rate);
        self.set_rate(cci, rate).map(|_| ())
    }
}
