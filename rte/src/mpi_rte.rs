//! Exchange over an MPI communicator.
//!
//! Every operation maps onto the matching MPI primitive. MPI delivers
//! messages addressed to one's own rank, so no self-mailbox is kept.

use mpi::collective::CommunicatorCollectives;
use mpi::point_to_point::{Destination, Source};
use mpi::topology::{Communicator, SimpleCommunicator};

use crate::Rte;
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::report::{PrintFlags, Reporter};

const RTE_TAG: mpi::Tag = 1;

/// Exchange group spanning every rank of `world`. Only rank 0 prints results.
pub struct MpiExchange {
    world: SimpleCommunicator,
    reporter: Reporter,
}

impl MpiExchange {
    /// Every rank holds the launcher-supplied configuration, so each one
    /// validates it locally.
    pub fn new(world: SimpleCommunicator, config: &RunConfig) -> Result<Self> {
        config.validate()?;

        let flags = if world.rank() == 0 {
            PrintFlags::PRINT_RESULTS
        } else {
            PrintFlags::empty()
        };
        Ok(Self {
            world,
            reporter: Reporter::new(flags),
        })
    }

    fn check_rank(&self, rank: u32) -> Result<i32> {
        let size = self.group_size();
        if rank < size {
            Ok(rank as i32)
        } else {
            Err(Error::InvalidRank { rank, size })
        }
    }
}

impl Rte for MpiExchange {
    fn group_size(&self) -> u32 {
        self.world.size() as u32
    }

    fn group_index(&self) -> u32 {
        self.world.rank() as u32
    }

    fn barrier(&mut self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn send(&mut self, dest: u32, data: &[u8]) -> Result<()> {
        let dest = self.check_rank(dest)?;
        self.world.process_at_rank(dest).send_with_tag(data, RTE_TAG);
        Ok(())
    }

    fn recv(&mut self, src: u32, buf: &mut [u8]) -> Result<()> {
        let src = self.check_rank(src)?;
        self.world.process_at_rank(src).receive_into_with_tag(buf, RTE_TAG);
        Ok(())
    }

    fn reporter(&mut self) -> &mut Reporter {
        &mut self.reporter
    }
}
