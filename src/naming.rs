//! Names and the segment-number naming conventions.
//!
//! The fetcher only uses two operations from here: append a segment number to the object
//! prefix, and read a segment number back from a name component.

use std::fmt::Write;

/// TLV-TYPE of a generic name component.
pub const TT_GENERIC_COMPONENT: u16 = 8;
/// TLV-TYPE of a typed segment number component (naming conventions rev3).
pub const TT_SEGMENT_COMPONENT: u16 = 50;

/// One name component: a TLV-TYPE and an opaque value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Component {
    pub typ: u16,
    pub value: Vec<u8>,
}

impl Component {
    pub fn new(typ: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            typ,
            value: value.into(),
        }
    }

    pub fn generic(value: impl Into<Vec<u8>>) -> Self {
        Self::new(TT_GENERIC_COMPONENT, value)
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.typ == TT_SEGMENT_COMPONENT {
            if let Some(n) = decode_nni(&self.value) {
                return write!(f, "seg={n}");
            }
        }
        if self.typ != TT_GENERIC_COMPONENT {
            write!(f, "{}=", self.typ)?;
        }
        for b in &self.value {
            if b.is_ascii_alphanumeric() || b"-._~".contains(b) {
                f.write_char(*b as char)?;
            } else {
                write!(f, "%{b:02X}")?;
            }
        }
        Ok(())
    }
}

/// A hierarchical name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Name(Vec<Component>);

impl Name {
    pub fn new(components: Vec<Component>) -> Self {
        Self(components)
    }

    /// Builds a name out of generic components, e.g. `Name::from_generic(["R", "v1"])`.
    pub fn from_generic<I, C>(components: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self(components.into_iter().map(Component::generic).collect())
    }

    pub fn components(&self) -> &[Component] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Component> {
        self.0.last()
    }

    pub fn append(&self, component: Component) -> Name {
        let mut c = self.0.clone();
        c.push(component);
        Name(c)
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_char('/');
        }
        for c in &self.0 {
            write!(f, "/{c}")?;
        }
        Ok(())
    }
}

/// Maps segment numbers to name components and back.
pub trait SegmentConvention: Send + Sync + core::fmt::Debug {
    fn create(&self, segment: u64) -> Component;

    /// Returns None if the component does not follow this convention.
    fn parse(&self, component: &Component) -> Option<u64>;

    fn append(&self, prefix: &Name, segment: u64) -> Name {
        prefix.append(self.create(segment))
    }
}

/// Typed segment number component, `seg=N`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Segment3;

impl SegmentConvention for Segment3 {
    fn create(&self, segment: u64) -> Component {
        Component::new(TT_SEGMENT_COMPONENT, encode_nni(segment))
    }

    fn parse(&self, component: &Component) -> Option<u64> {
        if component.typ != TT_SEGMENT_COMPONENT {
            return None;
        }
        decode_nni(&component.value)
    }
}

/// Marker-based segment number component: generic component with a 0x00 marker byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct Segment2;

const SEGMENT2_MARKER: u8 = 0x00;

impl SegmentConvention for Segment2 {
    fn create(&self, segment: u64) -> Component {
        let mut value = vec![SEGMENT2_MARKER];
        value.extend_from_slice(&encode_nni(segment));
        Component::generic(value)
    }

    fn parse(&self, component: &Component) -> Option<u64> {
        if component.typ != TT_GENERIC_COMPONENT {
            return None;
        }
        match component.value.split_first() {
            Some((&SEGMENT2_MARKER, rest)) => decode_nni(rest),
            _ => None,
        }
    }
}

/// NonNegativeInteger: shortest of 1, 2, 4 or 8 big-endian bytes.
fn encode_nni(n: u64) -> Vec<u8> {
    if n <= u8::MAX as u64 {
        vec![n as u8]
    } else if n <= u16::MAX as u64 {
        (n as u16).to_be_bytes().to_vec()
    } else if n <= u32::MAX as u64 {
        (n as u32).to_be_bytes().to_vec()
    } else {
        n.to_be_bytes().to_vec()
    }
}

fn decode_nni(b: &[u8]) -> Option<u64> {
    match b.len() {
        1 => Some(b[0] as u64),
        2 => Some(u16::from_be_bytes(b.try_into().ok()?) as u64),
        4 => Some(u32::from_be_bytes(b.try_into().ok()?) as u64),
        8 => Some(u64::from_be_bytes(b.try_into().ok()?)),
        _ => None,
    }
}
