//! Collecting the sections of one table instance.

use super::section::Section;
use super::CurrentNext;
use crate::packet::Pid;
use std::fmt;
use std::sync::Arc;

/// The complete set of sections that make up one instance of a table, identified by its
/// `table_id`, `table_id_extension` and `version`.
///
/// Sections are shared (`Arc`), so a `BinaryTable` received by a handler can be cloned and kept
/// cheaply, and remains unchanged whatever the demultiplexer does next.
///
/// A table built from a short section always consists of just that one section.
#[derive(Clone, Default)]
pub struct BinaryTable {
    table_id: u8,
    table_id_extension: u16,
    version: u8,
    current_next: Option<CurrentNext>,
    source_pid: Option<Pid>,
    short: bool,
    sections: Vec<Option<Arc<Section>>>,
    missing: usize,
}

impl BinaryTable {
    pub fn new() -> BinaryTable {
        BinaryTable::default()
    }

    /// Build a table from a list of sections, returning `None` unless every section could be
    /// added and the resulting table is complete.
    pub fn from_sections<I>(sections: I) -> Option<BinaryTable>
    where
        I: IntoIterator<Item = Arc<Section>>,
    {
        let mut table = BinaryTable::new();
        for s in sections {
            if !table.add_section(s) {
                return None;
            }
        }
        if table.is_valid() {
            Some(table)
        } else {
            None
        }
    }

    fn init_from(&mut self, section: &Section) {
        self.table_id = section.table_id();
        self.source_pid = Some(section.source_pid());
        if section.is_long_section() {
            self.short = false;
            self.table_id_extension = section.table_id_extension();
            self.version = section.version();
            self.current_next = Some(section.current_next());
            let count = usize::from(section.last_section_number()) + 1;
            self.sections = vec![None; count];
            self.missing = count;
        } else {
            self.short = true;
            self.table_id_extension = 0;
            self.version = 0;
            self.current_next = Some(CurrentNext::Current);
            self.sections = vec![None];
            self.missing = 1;
        }
    }

    fn conflicts_with(&self, section: &Section) -> bool {
        self.short
            || section.is_short_section()
            || section.table_id() != self.table_id
            || section.table_id_extension() != self.table_id_extension
            || section.version() != self.version
            || Some(section.current_next()) != self.current_next
            || usize::from(section.last_section_number()) + 1 != self.sections.len()
    }

    /// Add a section to the table.
    ///
    /// The first section added defines the identity of the table.  Any later section which
    /// disagrees with it about `table_id`, `table_id_extension`, `version`, current/next
    /// applicability or `last_section_number` is rejected, as are invalid sections.  Returns
    /// `true` if the section was stored.  A section with a number already present replaces the
    /// earlier copy.
    pub fn add_section(&mut self, section: Arc<Section>) -> bool {
        if !section.is_valid() {
            return false;
        }
        if self.sections.is_empty() {
            self.init_from(&section);
        } else if self.conflicts_with(&section) {
            return false;
        }
        let index = usize::from(section.section_number());
        match self.sections.get_mut(index) {
            Some(slot) => {
                if slot.is_none() {
                    self.missing -= 1;
                }
                *slot = Some(section);
                true
            }
            None => false,
        }
    }

    /// `true` once every section `0..=last_section_number` is present.
    pub fn is_valid(&self) -> bool {
        !self.sections.is_empty() && self.missing == 0
    }

    /// Forget all sections, returning the table to its initial empty state.
    pub fn clear(&mut self) {
        *self = BinaryTable::default();
    }

    pub fn table_id(&self) -> u8 {
        self.table_id
    }

    /// Always `0` for tables made from a short section.
    pub fn table_id_extension(&self) -> u16 {
        self.table_id_extension
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn current_next(&self) -> Option<CurrentNext> {
        self.current_next
    }

    /// The PID carrying the first section added to this table.
    pub fn source_pid(&self) -> Option<Pid> {
        self.source_pid
    }

    pub fn is_short_section(&self) -> bool {
        self.short
    }

    /// The number of sections this table is made of (present or not), i.e.
    /// `last_section_number + 1`.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// The number of sections still to be received.
    pub fn missing_count(&self) -> usize {
        self.missing
    }

    /// The section with the given `section_number`, if present.
    pub fn section_at(&self, index: usize) -> Option<&Arc<Section>> {
        self.sections.get(index).and_then(|s| s.as_ref())
    }

    /// Iterate over the sections present, in `section_number` order.
    pub fn sections(&self) -> impl Iterator<Item = &Arc<Section>> {
        self.sections.iter().filter_map(|s| s.as_ref())
    }

    /// Total size in bytes of the sections present.
    pub fn total_size(&self) -> usize {
        self.sections().map(|s| s.size()).sum()
    }
}

impl fmt::Debug for BinaryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryTable")
            .field("table_id", &self.table_id)
            .field("table_id_extension", &self.table_id_extension)
            .field("version", &self.version)
            .field("source_pid", &self.source_pid)
            .field("sections", &self.sections.len())
            .field("missing", &self.missing)
            .finish()
    }
}

impl PartialEq for BinaryTable {
    /// Tables are equal when they hold byte-identical sections.
    fn eq(&self, other: &BinaryTable) -> bool {
        self.sections.len() == other.sections.len()
            && self
                .sections
                .iter()
                .zip(other.sections.iter())
                .all(|(a, b)| match (a, b) {
                    (Some(a), Some(b)) => a.content() == b.content(),
                    (None, None) => true,
                    _ => false,
                })
    }
}
