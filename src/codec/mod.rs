//! Wire codec: J1939 identifiers, the frozen PGN/SPN table, and DM1/DM2
//! bit-packing. Pure functions only — no I/O, no clocks.

pub mod dm;
pub mod identifier;
pub mod pgn;
pub mod spn;

pub use dm::{decode_dm, decode_lamps, encode_dm, encode_lamps, Dtc, DmReport, LampStatus};
pub use identifier::{build, parse, J1939Id, J1939IdFields};
pub use spn::{DecodedSpn, SpnDescriptor};
