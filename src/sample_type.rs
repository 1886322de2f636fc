//! The element type of a channel's sample dataset.
//!
//! Digital RF's original implementation carries a byte-order flag and a
//! numpy dtype character around separately. Design Notes §9 asks for a
//! sum type instead, so invalid combinations (a "dtype string" that
//! doesn't parse, an endianness that wasn't asked for) can't exist.
//! Translation to the concrete HDF5 type happens in exactly one place:
//! [`SampleType::h5_element_size`] and the `hdf5`-feature constructors
//! in `file_writer`.

use crate::error::{DigitalRfError, DigitalRfResult};

/// Byte order of a stored scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

/// A scalar numeric representation: integer or IEEE float, at a given
/// bit width and byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    /// Fixed-width integer.
    Int {
        /// Bit width: 8, 16, 32, or 64.
        bits: u8,
        /// Whether the integer is signed.
        signed: bool,
        /// Byte order used on disk.
        endian: Endian,
    },
    /// IEEE-754 floating point.
    Float {
        /// Bit width: 32 or 64.
        bits: u8,
        /// Byte order used on disk.
        endian: Endian,
    },
}

impl Scalar {
    /// Size of one scalar in bytes.
    #[must_use]
    pub const fn byte_size(self) -> usize {
        match self {
            Self::Int { bits, .. } | Self::Float { bits, .. } => bits as usize / 8,
        }
    }

    fn validate(self) -> DigitalRfResult<()> {
        match self {
            Self::Int { bits, .. } if matches!(bits, 8 | 16 | 32 | 64) => Ok(()),
            Self::Float { bits, .. } if matches!(bits, 32 | 64) => Ok(()),
            other => Err(DigitalRfError::ConfigInvalid(format!(
                "unsupported scalar width: {other:?}"
            ))),
        }
    }
}

/// The full element type of `rf_data`: a bare scalar, or a complex pair
/// of two identical scalars named `r` and `i` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    /// A single real-valued scalar per subchannel element.
    Real(Scalar),
    /// A `{r, i}` compound of two identical scalars per subchannel
    /// element.
    Complex(Scalar),
}

impl SampleType {
    /// Construct a real sample type, validating the bit width.
    pub fn real(scalar: Scalar) -> DigitalRfResult<Self> {
        scalar.validate()?;
        Ok(Self::Real(scalar))
    }

    /// Construct a complex sample type, validating the bit width of
    /// its underlying scalar.
    pub fn complex(scalar: Scalar) -> DigitalRfResult<Self> {
        scalar.validate()?;
        Ok(Self::Complex(scalar))
    }

    /// Whether this type is complex (`is_complex` in §3/§6).
    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex(_))
    }

    /// The underlying scalar (real part, for complex types).
    #[must_use]
    pub const fn scalar(self) -> Scalar {
        match self {
            Self::Real(s) | Self::Complex(s) => s,
        }
    }

    /// Size in bytes of one element as stored in `rf_data` (one scalar
    /// for real types, two for complex).
    #[must_use]
    pub const fn element_byte_size(self) -> usize {
        match self {
            Self::Real(s) => s.byte_size(),
            Self::Complex(s) => s.byte_size() * 2,
        }
    }
}

impl Scalar {
    fn encode(self) -> String {
        let endian = match self {
            Self::Int { endian, .. } | Self::Float { endian, .. } => endian,
        };
        let endian_tag = match endian {
            Endian::Little => "le",
            Endian::Big => "be",
        };
        match self {
            Self::Int { bits, signed, .. } => {
                let sign = if signed { "int" } else { "uint" };
                format!("{sign}{bits}{endian_tag}")
            }
            Self::Float { bits, .. } => format!("float{bits}{endian_tag}"),
        }
    }

    fn parse(s: &str) -> DigitalRfResult<Self> {
        let (endian, body) = if let Some(body) = s.strip_suffix("le") {
            (Endian::Little, body)
        } else if let Some(body) = s.strip_suffix("be") {
            (Endian::Big, body)
        } else {
            return Err(DigitalRfError::ConfigInvalid(format!(
                "sample type descriptor {s:?} is missing an le/be suffix"
            )));
        };

        let parse_bits = |digits: &str| -> DigitalRfResult<u8> {
            digits.parse::<u8>().map_err(|_| {
                DigitalRfError::ConfigInvalid(format!("malformed sample type descriptor {s:?}"))
            })
        };

        let scalar = if let Some(digits) = body.strip_prefix("int") {
            Scalar::Int {
                bits: parse_bits(digits)?,
                signed: true,
                endian,
            }
        } else if let Some(digits) = body.strip_prefix("uint") {
            Scalar::Int {
                bits: parse_bits(digits)?,
                signed: false,
                endian,
            }
        } else if let Some(digits) = body.strip_prefix("float") {
            Scalar::Float {
                bits: parse_bits(digits)?,
                endian,
            }
        } else {
            return Err(DigitalRfError::ConfigInvalid(format!(
                "unrecognized sample type descriptor {s:?}"
            )));
        };
        scalar.validate()?;
        Ok(scalar)
    }
}

impl SampleType {
    /// Render this type as the stable descriptor string stored in
    /// `drf_properties.h5` (§4.5's "type descriptors"), e.g.
    /// `"int16le"` or `"complex_float32be"`.
    #[must_use]
    pub fn encode(self) -> String {
        match self {
            Self::Real(s) => s.encode(),
            Self::Complex(s) => format!("complex_{}", s.encode()),
        }
    }

    /// Parse a descriptor string produced by [`SampleType::encode`].
    pub fn decode(s: &str) -> DigitalRfResult<Self> {
        if let Some(rest) = s.strip_prefix("complex_") {
            Self::complex(Scalar::parse(rest)?)
        } else {
            Self::real(Scalar::parse(s)?)
        }
    }
}
