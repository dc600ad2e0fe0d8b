//! Types related to the _Program Association Table_

use super::decode::{check_table, DecodeError};
use super::{tid, BinaryTable};
use crate::packet::Pid;
use log::warn;
use std::collections::BTreeMap;

/// One 4-byte entry of a PAT section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramDescriptor {
    /// `program_number` 0 gives the PID of the Network Information Table
    Network { pid: Pid },
    Program { program_number: u16, pid: Pid },
}

impl ProgramDescriptor {
    pub const SIZE: usize = 4;

    /// panics if fewer than 4 bytes are provided
    pub fn from_bytes(data: &[u8]) -> ProgramDescriptor {
        let program_number = (u16::from(data[0]) << 8) | u16::from(data[1]);
        let pid = Pid::new((u16::from(data[2]) & 0b0001_1111) << 8 | u16::from(data[3]));
        if program_number == 0 {
            ProgramDescriptor::Network { pid }
        } else {
            ProgramDescriptor::Program {
                program_number,
                pid,
            }
        }
    }

    pub fn pid(&self) -> Pid {
        match *self {
            ProgramDescriptor::Network { pid } => pid,
            ProgramDescriptor::Program { pid, .. } => pid,
        }
    }
}

/// A view over the payload of one section of the _Program Association Table_, which lists the
/// programs within a transport stream.  There may be only one program, or in the case of a
/// broadcast multiplex, there may be many.
#[derive(Clone, Debug)]
pub struct PatSection<'buf> {
    data: &'buf [u8],
}
impl<'buf> PatSection<'buf> {
    /// Wrap the payload (the bytes after the table syntax header, CRC excluded) of a PAT section.
    pub fn new(data: &'buf [u8]) -> PatSection<'buf> {
        PatSection { data }
    }
    pub fn programs(&self) -> impl Iterator<Item = ProgramDescriptor> + 'buf {
        ProgramIter::new(self.data)
    }
}

/// Iterate over the list of programs in a `PatSection`.
struct ProgramIter<'buf> {
    chunks: std::slice::ChunksExact<'buf, u8>,
}
impl<'buf> ProgramIter<'buf> {
    fn new(buf: &'buf [u8]) -> ProgramIter<'buf> {
        let chunks = buf.chunks_exact(ProgramDescriptor::SIZE);
        if !chunks.remainder().is_empty() {
            warn!(
                "PAT section payload of {} bytes is not a whole number of program entries",
                buf.len()
            );
        }
        ProgramIter { chunks }
    }
}
impl<'buf> Iterator for ProgramIter<'buf> {
    type Item = ProgramDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().map(ProgramDescriptor::from_bytes)
    }
}

/// A decoded _Program Association Table_, gathered from all of its sections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pat {
    pub transport_stream_id: u16,
    pub version: u8,
    /// The PID of the NIT, if the table gives one
    pub nit_pid: Option<Pid>,
    /// PMT PIDs, indexed by `program_number`
    pub programs: BTreeMap<u16, Pid>,
}

impl Pat {
    pub fn decode(table: &BinaryTable) -> Result<Pat, DecodeError> {
        check_table(table, tid::PAT)?;
        let mut pat = Pat {
            transport_stream_id: table.table_id_extension(),
            version: table.version(),
            ..Pat::default()
        };
        for section in table.sections() {
            for prog in PatSection::new(section.payload()).programs() {
                match prog {
                    ProgramDescriptor::Network { pid } => pat.nit_pid = Some(pid),
                    ProgramDescriptor::Program {
                        program_number,
                        pid,
                    } => {
                        pat.programs.insert(program_number, pid);
                    }
                }
            }
        }
        Ok(pat)
    }

    /// The distinct PIDs carrying the PMTs of the programs listed.
    pub fn pmt_pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.programs.values().copied().collect();
        pids.sort_by_key(|p| u16::from(*p));
        pids.dedup();
        pids
    }
}
