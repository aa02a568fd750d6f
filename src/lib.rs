//! Arbitrary-precision CRC arithmetic and algorithm recovery.
//!
//! This crate provides GF(2) polynomials of arbitrary width, the
//! Williams parameter model that describes practical CRC algorithms,
//! and an engine that recovers unknown model parameters (generator
//! polynomial, initial register, final XOR, reflection senses) from
//! sample messages with their observed CRCs.
//!
//! ``` rust
//! use crchound::{Model, ModelFlags, Poly};
//!
//! // CRC-16/IBM-3740 of "123456789"
//! let model = Model::new(
//!     Poly::from_value(16, 0x1021),
//!     Poly::from_value(16, 0xffff),
//!     Poly::from_value(16, 0x0000),
//!     ModelFlags::MULXN,
//! );
//! assert_eq!(model.check, Poly::from_value(16, 0x29b1));
//! ```

/// Arbitrary-precision GF(2) polynomials
pub mod poly;
pub use poly::*;

/// Williams-model CRC descriptions
pub mod model;
pub use model::*;

/// Named preset models
pub mod preset;

/// The parameter recovery engine
pub mod reveng;
pub use reveng::*;
