//! Typed array aliasing over raw byte buffers.
//!
//! An [`ArrayConverter`] carries the per-type metadata needed to view a
//! `[T]` as `[u8]` and back. Viewing an array as bytes never copies. Viewing
//! bytes as an array borrows in place when the buffer is suitably aligned and
//! falls back to an aligned copy otherwise, so callers see the same contract
//! either way.
//!
//! Converters are created lazily per element type and cached in a
//! [`ConverterCache`] owned by the caller.

use crate::error::ArrayError;
use bytemuck::Pod;
use dashmap::DashMap;
use std::any::{type_name, TypeId};
use std::borrow::Cow;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::debug;

/// Primitive element kinds that can be aliased
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementTag {
    /// `u8`
    U8,
    /// `i8`
    I8,
    /// `u16`
    U16,
    /// `i16`
    I16,
    /// `u32`
    U32,
    /// `i32`
    I32,
    /// `u64`
    U64,
    /// `i64`
    I64,
    /// `f32`
    F32,
    /// `f64`
    F64,
}

impl ElementTag {
    /// Size of one element in bytes
    pub fn size(self) -> usize {
        match self {
            ElementTag::U8 | ElementTag::I8 => 1,
            ElementTag::U16 | ElementTag::I16 => 2,
            ElementTag::U32 | ElementTag::I32 | ElementTag::F32 => 4,
            ElementTag::U64 | ElementTag::I64 | ElementTag::F64 => 8,
        }
    }
}

/// Fixed-size element types with no indirections
pub trait Element: Pod + Send + Sync + 'static {
    /// Tag identifying the element kind
    const TAG: ElementTag;
}

macro_rules! impl_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const TAG: ElementTag = ElementTag::$tag;
            }
        )*
    };
}

impl_element! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

/// Cached metadata for aliasing one element type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayConverter {
    element_size: usize,
    align_doubles: bool,
    element_tag: ElementTag,
    byte_tag: ElementTag,
    type_name: &'static str,
}

impl ArrayConverter {
    /// Create a converter for `T`
    pub fn new<T: Element>() -> Result<Self, ArrayError> {
        let element_size = std::mem::size_of::<T>();
        if element_size == 0 {
            return Err(ArrayError::ZeroSized(type_name::<T>()));
        }

        Ok(Self {
            element_size,
            align_doubles: T::TAG == ElementTag::F64 && cfg!(target_pointer_width = "32"),
            element_tag: T::TAG,
            byte_tag: ElementTag::U8,
            type_name: type_name::<T>(),
        })
    }

    /// Size of one element in bytes
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Whether byte-to-array conversion always goes through an aligned copy
    pub fn align_doubles(&self) -> bool {
        self.align_doubles
    }

    /// Tag of the element type
    pub fn element_tag(&self) -> ElementTag {
        self.element_tag
    }

    /// Tag of the byte view (always `U8`)
    pub fn byte_tag(&self) -> ElementTag {
        self.byte_tag
    }

    /// View `array` as raw bytes without copying
    pub fn to_bytes<'a, T: Element>(&self, array: &'a [T]) -> Result<&'a [u8], ArrayError> {
        self.check::<T>()?;
        if array.is_empty() {
            return Err(ArrayError::Empty);
        }
        Ok(bytemuck::cast_slice(array))
    }

    /// View `array` as mutable raw bytes without copying.
    ///
    /// The exclusive borrow keeps every other owner out until the byte view
    /// is dropped.
    pub fn to_bytes_mut<'a, T: Element>(
        &self,
        array: &'a mut [T],
    ) -> Result<&'a mut [u8], ArrayError> {
        self.check::<T>()?;
        if array.is_empty() {
            return Err(ArrayError::Empty);
        }
        Ok(bytemuck::cast_slice_mut(array))
    }

    /// View `bytes` as `[T]`, borrowing when alignment allows
    pub fn from_bytes<'a, T: Element>(&self, bytes: &'a [u8]) -> Result<Cow<'a, [T]>, ArrayError> {
        self.check::<T>()?;
        self.check_len(bytes.len())?;

        if !self.align_doubles {
            if let Ok(view) = bytemuck::try_cast_slice::<u8, T>(bytes) {
                return Ok(Cow::Borrowed(view));
            }
        }

        Ok(Cow::Owned(self.copy_from_bytes(bytes)))
    }

    /// Convert an owned array into its byte representation
    pub fn into_bytes<T: Element>(&self, array: Vec<T>) -> Result<Vec<u8>, ArrayError> {
        Ok(self.to_bytes(&array)?.to_vec())
    }

    /// Convert an owned byte block into an array of `len / size_of::<T>()` elements
    pub fn from_byte_vec<T: Element>(&self, bytes: Vec<u8>) -> Result<Vec<T>, ArrayError> {
        self.check::<T>()?;
        self.check_len(bytes.len())?;
        Ok(self.copy_from_bytes(&bytes))
    }

    fn copy_from_bytes<T: Element>(&self, bytes: &[u8]) -> Vec<T> {
        let mut out = vec![T::zeroed(); bytes.len() / self.element_size];
        bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(bytes);
        out
    }

    fn check_len(&self, len: usize) -> Result<(), ArrayError> {
        if len == 0 {
            return Err(ArrayError::Empty);
        }
        if len % self.element_size != 0 {
            return Err(ArrayError::LengthMismatch {
                len,
                element_size: self.element_size,
            });
        }
        Ok(())
    }

    fn check<T: Element>(&self) -> Result<(), ArrayError> {
        if T::TAG != self.element_tag {
            return Err(ArrayError::TagMismatch {
                expected: self.type_name,
                found: type_name::<T>(),
            });
        }
        Ok(())
    }
}

/// Lazily populated converter cache keyed by element type
#[derive(Debug, Default)]
pub struct ConverterCache {
    converters: DashMap<TypeId, Arc<ArrayConverter>>,
}

impl ConverterCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            converters: DashMap::new(),
        }
    }

    /// Get or create the converter for `T`.
    ///
    /// Concurrent first use of the same type resolves to one shared instance.
    pub fn get<T: Element>(&self) -> Result<Arc<ArrayConverter>, ArrayError> {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.converters.get(&type_id) {
            return Ok(existing.clone());
        }

        let created = Arc::new(ArrayConverter::new::<T>()?);
        let entry = self.converters.entry(type_id).or_insert_with(|| {
            debug!("Created array converter for {}", type_name::<T>());
            created
        });
        Ok(entry.value().clone())
    }

    /// Number of cached converters
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    /// Whether no converter has been created yet
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

/// Array blitting to and from byte streams.
///
/// Values are written in native byte order; data written here must be read
/// back with [`ArrayIo::read_array`] on a machine of the same endianness.
#[derive(Debug, Default)]
pub struct ArrayIo {
    cache: ConverterCache,
}

impl ArrayIo {
    /// Create with an empty converter cache
    pub fn new() -> Self {
        Self {
            cache: ConverterCache::new(),
        }
    }

    /// Converter for `T`
    pub fn converter<T: Element>(&self) -> Result<Arc<ArrayConverter>, ArrayError> {
        self.cache.get::<T>()
    }

    /// View `array` as bytes
    pub fn to_bytes<'a, T: Element>(&self, array: &'a [T]) -> Result<&'a [u8], ArrayError> {
        self.converter::<T>()?.to_bytes(array)
    }

    /// View `bytes` as `[T]`
    pub fn from_bytes<'a, T: Element>(&self, bytes: &'a [u8]) -> Result<Cow<'a, [T]>, ArrayError> {
        self.converter::<T>()?.from_bytes(bytes)
    }

    /// Read `count` elements straight into a typed allocation
    pub fn read_array<T: Element, R: Read>(
        &self,
        reader: &mut R,
        count: usize,
    ) -> io::Result<Vec<T>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let converter = self.converter::<T>().map_err(invalid_input)?;

        let mut out = vec![T::zeroed(); count];
        let bytes = converter.to_bytes_mut(&mut out).map_err(invalid_input)?;
        reader.read_exact(bytes)?;
        Ok(out)
    }

    /// Write `array` as raw bytes; empty arrays write nothing
    pub fn write_array<T: Element, W: Write>(&self, writer: &mut W, array: &[T]) -> io::Result<()> {
        if array.is_empty() {
            return Ok(());
        }
        let converter = self.converter::<T>().map_err(invalid_input)?;
        writer.write_all(converter.to_bytes(array).map_err(invalid_input)?)
    }
}

fn invalid_input(err: ArrayError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err)
}
