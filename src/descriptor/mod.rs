//! Descriptors provide metadata about an element of a PSI/SI table.
//!
//! For example, a descriptor may give the language of an audio track in a PMT, or the local time
//! offsets of a country in a TOT.  Most table syntaxes contain one or more 'descriptor loops',
//! a run of `tag`, `length`, `payload` triples, which [`DescriptorIter`](struct.DescriptorIter.html)
//! walks over.
//!
//! # Extensions
//!
//! Descriptors are a point of extension, with a range of descriptor types defined by the core
//! standards, and further types defined by standards based upon them.  Descriptor-related types
//! and methods in this crate take a type-parameter so that calling code which wants to handle
//! other descriptors can supply a type which supports them, for instance one generated with
//! [`descriptor_enum!{}`](../macro.descriptor_enum.html).
//!
//! ```
//! # use tssection::descriptor::{CoreDescriptors, DescriptorIter};
//! let data = [0x0a, 0x04, b'e', b'n', b'g', 0x00];
//! for d in DescriptorIter::<CoreDescriptors<'_>>::new(&data) {
//!     if let Ok(CoreDescriptors::ISO639Language(lang)) = d {
//!         for l in lang.languages() {
//!             println!("language {}", l.code());
//!         }
//!     }
//! }
//! ```

pub mod iso_639_language;
pub mod local_time_offset;

use self::iso_639_language::Iso639LanguageDescriptor;
use self::local_time_offset::LocalTimeOffsetDescriptor;
use std::error;
use std::fmt;
use std::marker;

/// Trait allowing a descriptor loop to produce values of the implementing type.
pub trait Descriptor<'buf>: Sized {
    /// Parse a descriptor from `buf`, which holds exactly one descriptor, including its `tag`
    /// and `length` bytes.
    fn from_bytes(buf: &'buf [u8]) -> Result<Self, DescriptorError>;
}

/// Builds an enum to act as a `Descriptor` implementation, dispatching on the value of the
/// descriptor tag.  Each variant names the tag values it handles, and a type with a
/// `new(tag, payload) -> Result<Self, DescriptorError>` function that parses the descriptor
/// payload.
///
/// ```
/// # #[macro_use] extern crate tssection;
/// # use tssection::descriptor::UnknownDescriptor;
/// # use tssection::descriptor::local_time_offset::LocalTimeOffsetDescriptor;
/// descriptor_enum! {
///     #[derive(Debug)]
///     TimeDescriptors {
///         LocalTimeOffset 0x58 => LocalTimeOffsetDescriptor,
///         Other 0..=0x57 | 0x59..=0xff => UnknownDescriptor,
///     }
/// }
/// # fn main() {}
/// ```
#[macro_export]
macro_rules! descriptor_enum {
    (
        $(#[$outer:meta])*
        $name:ident {
            $(
                $(#[$inner:ident $($args:tt)*])*
                $case_name:ident $($tags:pat_param)|* => $t:ident
            ),*,
        }
    ) => {
        $(#[$outer])*
        pub enum $name<'buf> {
            $(
                $(#[$inner $($args)*])*
                $case_name($t<'buf>),
            )*
        }
        impl<'buf> $crate::descriptor::Descriptor<'buf> for $name<'buf> {
            fn from_bytes(buf: &'buf [u8]) -> Result<Self, $crate::descriptor::DescriptorError> {
                let (tag, payload) = $crate::descriptor::split_descriptor(buf)?;
                match tag {
                    $( $( $tags )|* => Ok($name::$case_name($t::new(tag, payload)?)), )*
                    #[allow(unreachable_patterns)]
                    _ => Err($crate::descriptor::DescriptorError::UnhandledTagValue(tag)),
                }
            }
        }
    }
}

/// Check the length of a single descriptor, returning its tag and payload.
pub fn split_descriptor(buf: &[u8]) -> Result<(u8, &[u8]), DescriptorError> {
    if buf.len() < 2 {
        return Err(DescriptorError::BufferTooShort { buflen: buf.len() });
    }
    let tag = buf[0];
    let len = buf[1] as usize;
    let tag_end = len + 2;
    if tag_end > buf.len() {
        return Err(DescriptorError::TagTooLongForBuffer {
            taglen: len,
            buflen: buf.len(),
        });
    }
    Ok((tag, &buf[2..tag_end]))
}

/// Any descriptor, left uninterpreted.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UnknownDescriptor<'buf> {
    pub tag: u8,
    pub payload: &'buf [u8],
}
impl<'buf> UnknownDescriptor<'buf> {
    pub fn new(tag: u8, payload: &'buf [u8]) -> Result<UnknownDescriptor<'buf>, DescriptorError> {
        Ok(UnknownDescriptor { tag, payload })
    }
}
impl<'buf> Descriptor<'buf> for UnknownDescriptor<'buf> {
    fn from_bytes(buf: &'buf [u8]) -> Result<Self, DescriptorError> {
        let (tag, payload) = split_descriptor(buf)?;
        UnknownDescriptor::new(tag, payload)
    }
}
impl<'buf> fmt::Debug for UnknownDescriptor<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("UnknownDescriptor")
            .field("tag", &self.tag)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// A descriptor copied out of its table, for use in decoded tables which outlive the section
/// buffers.
#[derive(Clone, PartialEq, Eq)]
pub struct OwnedDescriptor {
    data: Vec<u8>,
}
impl OwnedDescriptor {
    /// Panics if `payload` is longer than 255 bytes.
    pub fn new(tag: u8, payload: &[u8]) -> OwnedDescriptor {
        assert!(payload.len() <= usize::from(u8::MAX));
        let mut data = Vec::with_capacity(payload.len() + 2);
        data.push(tag);
        data.push(payload.len() as u8);
        data.extend_from_slice(payload);
        OwnedDescriptor { data }
    }
    pub fn tag(&self) -> u8 {
        self.data[0]
    }
    pub fn payload(&self) -> &[u8] {
        &self.data[2..]
    }
    /// The descriptor bytes, `tag` and `length` included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
    /// Interpret this descriptor using any `Descriptor` implementation.
    pub fn parse<'a, Desc: Descriptor<'a>>(&'a self) -> Result<Desc, DescriptorError> {
        Desc::from_bytes(&self.data)
    }
}
impl<'buf> From<UnknownDescriptor<'buf>> for OwnedDescriptor {
    fn from(d: UnknownDescriptor<'buf>) -> OwnedDescriptor {
        OwnedDescriptor::new(d.tag, d.payload)
    }
}
impl fmt::Debug for OwnedDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.parse::<CoreDescriptors<'_>>() {
            Ok(d) => fmt::Debug::fmt(&d, f),
            Err(_) => f
                .debug_struct("OwnedDescriptor")
                .field("tag", &self.tag())
                .field("len", &self.payload().len())
                .finish(),
        }
    }
}

/// Copy every descriptor of a descriptor loop, failing if the loop is truncated.
pub fn collect_descriptors(buf: &[u8]) -> Result<Vec<OwnedDescriptor>, DescriptorError> {
    DescriptorIter::<UnknownDescriptor<'_>>::new(buf)
        .map(|d| d.map(OwnedDescriptor::from))
        .collect()
}

descriptor_enum! {
    /// The descriptors which this crate can interpret.
    #[derive(Debug)]
    CoreDescriptors {
        Reserved 0 | 1 => UnknownDescriptor,
        /// _ISO/IEC 13818-1_ descriptors not interpreted here
        Mpeg 0x02..=0x09 | 0x0b..=0x3f => UnknownDescriptor,
        ISO639Language 0x0a => Iso639LanguageDescriptor,
        /// _ETSI EN 300 468_ descriptors not interpreted here
        Dvb 0x40..=0x57 | 0x59..=0x7f => UnknownDescriptor,
        LocalTimeOffset 0x58 => LocalTimeOffsetDescriptor,
        UserPrivate 0x80..=0xff => UnknownDescriptor,
    }
}

/// Iterator over the descriptors in a descriptor loop.
///
/// Yields an error, and then stops, if the loop is truncated.
pub struct DescriptorIter<'buf, Desc>
where
    Desc: Descriptor<'buf>,
{
    buf: &'buf [u8],
    phantom: marker::PhantomData<Desc>,
}
impl<'buf, Desc> DescriptorIter<'buf, Desc>
where
    Desc: Descriptor<'buf>,
{
    pub fn new(buf: &'buf [u8]) -> DescriptorIter<'buf, Desc> {
        DescriptorIter {
            buf,
            phantom: marker::PhantomData,
        }
    }
}
impl<'buf, Desc> Iterator for DescriptorIter<'buf, Desc>
where
    Desc: Descriptor<'buf>,
{
    type Item = Result<Desc, DescriptorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        if self.buf.len() < 2 {
            let buflen = self.buf.len();
            self.buf = &self.buf[0..0];
            return Some(Err(DescriptorError::BufferTooShort { buflen }));
        }
        let tag = self.buf[0];
        let len = self.buf[1] as usize;
        let remaining_size = self.buf.len() - 2;
        if len > remaining_size {
            // ensure another call to next() will yield None,
            self.buf = &self.buf[0..0];
            Some(Err(DescriptorError::NotEnoughData {
                tag,
                actual: remaining_size,
                expected: len,
            }))
        } else {
            let (desc, rest) = self.buf.split_at(len + 2);
            self.buf = rest;
            Some(Descriptor::from_bytes(desc))
        }
    }
}

/// Problems found while reading descriptors.
#[derive(Debug, PartialEq, Eq)]
pub enum DescriptorError {
    /// The descriptor `length` claims more bytes than remain in the loop
    NotEnoughData {
        tag: u8,
        actual: usize,
        expected: usize,
    },
    TagTooLongForBuffer {
        taglen: usize,
        buflen: usize,
    },
    BufferTooShort {
        buflen: usize,
    },
    /// The payload does not have the structure required for this kind of descriptor
    InvalidLength {
        tag: u8,
        len: usize,
    },
    UnhandledTagValue(u8),
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::NotEnoughData {
                tag,
                actual,
                expected,
            } => write!(
                f,
                "descriptor {:#04x} needs {} bytes, only {} remain",
                tag, expected, actual
            ),
            DescriptorError::TagTooLongForBuffer { taglen, buflen } => write!(
                f,
                "descriptor length {} too long for {} byte buffer",
                taglen, buflen
            ),
            DescriptorError::BufferTooShort { buflen } => {
                write!(f, "{} bytes is too short to hold a descriptor", buflen)
            }
            DescriptorError::InvalidLength { tag, len } => {
                write!(f, "invalid length {} for descriptor {:#04x}", len, tag)
            }
            DescriptorError::UnhandledTagValue(tag) => {
                write!(f, "unhandled descriptor tag {:#04x}", tag)
            }
        }
    }
}

impl error::Error for DescriptorError {}
