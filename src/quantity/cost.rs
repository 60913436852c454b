use std::fmt::{Debug, Display, Formatter};

use crate::quantity::Quantity;

/// Norwegian kroner.
pub type Cost = Quantity<0, 0, 1>;

impl Cost {
    /// Round to [øre][1], the way monthly totals appear on an invoice.
    ///
    /// [1]: https://en.wikipedia.org/wiki/Norwegian_krone
    pub fn round_to_ore(self) -> Self {
        self.round_to(2)
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2} kr", self.0)
    }
}

impl Debug for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}kr", self.0)
    }
}
