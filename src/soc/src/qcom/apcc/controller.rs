use super::{ClockTree, MuxId, RateRequest, Source, TolerancePolicy, Variant};
use device::{ErrorKind, Regmap};
use log::info;
use spin::mutex::Mutex;

/// A probed clock controller, safe to share between CPUs
///
/// Every rate change holds the controller lock for its whole sequence of
/// PLL moves, reparenting and CCI updates.
pub struct Apcc<R> {
    tree: Mutex<ClockTree<R>>,
}

impl<R: Regmap> Apcc<R> {
    /// Match `compatible`, build its clock tree on `regmap` and probe it
    pub fn probe(
        regmap: R,
        compatible: &str,
        gpll_rate: u64,
        policy: TolerancePolicy,
    ) -> Result<Self, ErrorKind> {
        let variant = Variant::from_compatible(compatible)?;
        let mut tree = ClockTree::new(regmap, variant, gpll_rate, policy);
        tree.probe()?;
        info!("{}: registered {} clocks", compatible, tree.muxes().count());
        Ok(Self {
            tree: Mutex::new(tree),
        })
    }

    pub fn variant(&self) -> Variant {
        self.tree.lock().variant()
    }

    /// Ask for `rate` on a mux/divider; returns the rate it now runs at
    pub fn request_rate(&self, id: MuxId, rate: u64) -> Result<u64, ErrorKind> {
        self.tree.lock().set_rate(id, rate)
    }

    /// Negotiate `rate` without touching the hardware
    pub fn round_rate(&self, id: MuxId, rate: u64) -> Result<RateRequest, ErrorKind> {
        self.tree.lock().determine_rate(id, rate)
    }

    pub fn rate(&self, id: MuxId) -> Result<u64, ErrorKind> {
        self.tree.lock().rate(id)
    }

    pub fn requested_rate(&self, id: MuxId) -> Result<u64, ErrorKind> {
        self.tree.lock().requested_rate(id)
    }

    pub fn read_rate(&self, source: Source) -> Result<u64, ErrorKind> {
        self.tree.lock().read_rate(source)
    }

    /// Run `f` with the controller locked
    pub fn with<T>(&self, f: impl FnOnce(&mut ClockTree<R>) -> T) -> T {
        f(&mut self.tree.lock())
    }

    pub fn into_tree(self) -> ClockTree<R> {
        self.tree.into_inner()
    }
}
