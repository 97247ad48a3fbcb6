//! Manager key material

mod keys;

pub use keys::KeyAuthority;
