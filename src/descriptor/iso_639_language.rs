//! Language descriptor, _ISO/IEC 13818-1_ section 2.6.18

use super::DescriptorError;
use std::borrow::Cow;
use std::fmt;

/// Describes the language of an elementary stream, or of a whole program.
pub struct Iso639LanguageDescriptor<'buf> {
    buf: &'buf [u8],
}
impl<'buf> Iso639LanguageDescriptor<'buf> {
    pub const TAG: u8 = 0x0a;
    const ENTRY_SIZE: usize = 4;

    pub fn new(tag: u8, buf: &'buf [u8]) -> Result<Iso639LanguageDescriptor<'buf>, DescriptorError> {
        if buf.len() % Self::ENTRY_SIZE != 0 {
            return Err(DescriptorError::InvalidLength {
                tag,
                len: buf.len(),
            });
        }
        Ok(Iso639LanguageDescriptor { buf })
    }

    pub fn languages(&self) -> LanguageIterator<'buf> {
        LanguageIterator::new(self.buf)
    }
}

pub struct LanguageIterator<'buf> {
    remaining_data: &'buf [u8],
}
impl<'buf> LanguageIterator<'buf> {
    fn new(data: &'buf [u8]) -> LanguageIterator<'buf> {
        LanguageIterator {
            remaining_data: data,
        }
    }
}
impl<'buf> Iterator for LanguageIterator<'buf> {
    type Item = Language<'buf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining_data.len() < Iso639LanguageDescriptor::ENTRY_SIZE {
            None
        } else {
            let (head, tail) = self
                .remaining_data
                .split_at(Iso639LanguageDescriptor::ENTRY_SIZE);
            self.remaining_data = tail;
            Some(Language::new(head))
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AudioType {
    Undefined,
    CleanEffects,
    HearingImpaired,
    VisualImpairedCommentary,
    Reserved(u8),
}
impl From<u8> for AudioType {
    fn from(v: u8) -> Self {
        match v {
            0 => AudioType::Undefined,
            1 => AudioType::CleanEffects,
            2 => AudioType::HearingImpaired,
            3 => AudioType::VisualImpairedCommentary,
            _ => AudioType::Reserved(v),
        }
    }
}

pub struct Language<'buf> {
    buf: &'buf [u8],
}
impl<'buf> Language<'buf> {
    fn new(buf: &'buf [u8]) -> Language<'buf> {
        assert_eq!(buf.len(), Iso639LanguageDescriptor::ENTRY_SIZE);
        Language { buf }
    }
    /// The three-letter _ISO 639-2_ language code
    pub fn code(&self) -> Cow<'buf, str> {
        encoding_rs::mem::decode_latin1(&self.buf[0..3])
    }
    pub fn audio_type(&self) -> AudioType {
        AudioType::from(self.buf[3])
    }
}
impl<'buf> fmt::Debug for Language<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Language")
            .field("code", &self.code())
            .field("audio_type", &self.audio_type())
            .finish()
    }
}

struct LangsDebug<'buf>(&'buf Iso639LanguageDescriptor<'buf>);
impl<'buf> fmt::Debug for LangsDebug<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_list().entries(self.0.languages()).finish()
    }
}
impl<'buf> fmt::Debug for Iso639LanguageDescriptor<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Iso639LanguageDescriptor")
            .field("languages", &LangsDebug(self))
            .finish()
    }
}
