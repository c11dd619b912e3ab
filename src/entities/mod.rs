// Entity Models
//
// A single entity: the SWIFT code record. Its identity is the code string.

pub mod swift_code;

pub use swift_code::SwiftCode;
