//! KEL/TEL/ACDC core: a self-certifying identity and verifiable-credential
//! engine in the KERI/ACDC family.
//!
//! Reading order mirrors the dependency graph: [`cesr`] (primitive codec) →
//! [`said`] and [`version`] → [`events`]/[`tel`]/[`acdc`] (builders) →
//! [`kel`]/[`tel_state`] (replay) → [`attachment`]/[`parser`] (wire framing)
//! → [`store`] (persistence) → [`indexer`] (parallel structured index) →
//! [`graph`] (traversal views).

pub mod acdc;
pub mod attachment;
pub mod cesr;
pub mod error;
pub mod events;
pub mod graph;
pub mod indexer;
pub mod kel;
pub mod parser;
pub mod said;
pub mod store;
pub mod tel;
pub mod tel_state;
pub mod version;

pub use crate::cesr::Matter;
pub use crate::error::{Error, Result};

/// Initializes process-global cryptographic state. Must be called once
/// before any [`cesr::signer::Signer`] is used.
pub fn init() -> Result<()> {
    sodiumoxide::init().map_err(|_| Error::Codec("failed to initialize sodiumoxide".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert!(init().is_ok());
    }
}
