//! Table readers, writers and morphers

mod morph;
mod osc;
mod play;
mod rec;

pub use morph::TableMorph;
pub use osc::Osc;
pub use play::TablePlay;
pub use rec::TableRec;
