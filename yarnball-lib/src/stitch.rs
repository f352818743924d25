//! The table of primitive stitches.
//!
//! Every stitch is a single stack operation. Lookup from source text is case-insensitive,
//! display always uses the canonical lower case mnemonic.

use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Stitch {
    /// chain: push the literal operand
    Ch,
    /// single crochet: drop the top value
    Sc,
    /// double crochet: multiply
    Dc,
    /// bobble: add
    Bob,
    /// half double crochet: subtract the top from the second
    Hdc,
    /// treble: integer division, second by top
    Tr,
    /// cluster: remainder, second by top
    Cl,
    Inc,
    Dec,
    /// slip stitch: duplicate the top value
    Slst,
    Swap,
    /// rotate the top three values
    Turn,
    /// yarn over: print as a number
    Yo,
    /// picot: print as a character
    Pic,
    /// fasten off: halt
    Fo,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "<")]
    Less,
    Eq,
    Neq,
}

impl Stitch {
    /// how many values must be on the stack for this stitch to run
    pub fn arity(self) -> usize {
        use Stitch::*;
        match self {
            Ch | Fo => 0,
            Sc | Inc | Dec | Slst | Yo | Pic => 1,
            Dc | Bob | Hdc | Tr | Cl | Swap | Greater | Less | Eq | Neq => 2,
            Turn => 3,
        }
    }

    /// true for the stitches that need an integer operand in the source
    pub fn takes_operand(self) -> bool {
        matches!(self, Stitch::Ch)
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}
