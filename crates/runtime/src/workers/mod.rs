//! Background tasks internal to the crate.

mod flush;

pub(crate) use flush::{FlushCommand, FlushWorker};
