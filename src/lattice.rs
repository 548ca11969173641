//! The three-level value lattice used by the propagation engine.

/// Abstract value of one SSA variable.
///
/// The domain is flat: `Top` above everything, one incomparable level of
/// constants in the middle, `Bottom` below everything.
///
/// ```text
///      Top        no evidence yet (optimistic)
///     / | \
/// .. 1  2  3 ..   known constant
///     \ | /
///     Bottom      provably non-constant
/// ```
///
/// `Top` means the analysis has not yet seen any assignment reach the
/// variable, so it is still free to become anything; `Bottom` means two
/// conflicting assignments (or an inherently unknown value, such as a
/// function parameter) have been observed. The constant payload `C` is
/// whatever immediate representation the backend uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lattice<C> {
    Top,
    Const(C),
    Bottom,
}

impl<C: Clone + PartialEq> Lattice<C> {
    /// Greatest lower bound of two abstract values.
    ///
    /// `meet` obeys the usual lattice laws:
    ///
    /// * a `meet` a == a (idempotence)
    /// * a `meet` b == b `meet` a (commutativity)
    /// * a `meet` (b `meet` c) == (a `meet` b) `meet` c (associativity)
    /// * a `meet` Top == a
    /// * a `meet` Bottom == Bottom
    ///
    /// Because the chain height is two, any variable's value can change at
    /// most twice over a whole analysis (`Top` to `Const` to `Bottom`),
    /// which is what bounds the fixpoint's running time.
    pub fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (Lattice::Top, x) | (x, Lattice::Top) => x.clone(),
            (Lattice::Bottom, _) | (_, Lattice::Bottom) => Lattice::Bottom,
            (Lattice::Const(a), Lattice::Const(b)) => {
                if a == b {
                    Lattice::Const(a.clone())
                } else {
                    Lattice::Bottom
                }
            }
        }
    }

    /// `self <= other` in the lattice partial order (`Bottom` lowest).
    /// Constants are only comparable to themselves.
    pub fn le(&self, other: &Self) -> bool {
        match (self, other) {
            (_, Lattice::Top) => true,
            (Lattice::Bottom, _) => true,
            (Lattice::Const(a), Lattice::Const(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Lattice::Const(_))
    }

    pub fn as_const(&self) -> Option<&C> {
        match self {
            Lattice::Const(c) => Some(c),
            _ => None,
        }
    }
}
