//! Function source — wraps a user callback as a read-only source with
//! no lower layer, for callers who want to feed archive data from
//! something that isn't a file or an in-memory buffer (a socket, a
//! generator, ...).

use super::{Commands, Source};
use crate::error::Result;

pub struct FnSource<F> {
    read_fn: F,
}

impl<F> FnSource<F>
where
    F: FnMut(&mut [u8]) -> Result<usize>,
{
    pub fn new(read_fn: F) -> Self {
        FnSource { read_fn }
    }
}

impl<F> Source for FnSource<F>
where
    F: FnMut(&mut [u8]) -> Result<usize>,
{
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (self.read_fn)(buf)
    }

    fn supports(&self) -> Commands {
        Commands::READ
    }
}
