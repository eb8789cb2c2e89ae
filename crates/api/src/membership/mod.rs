//! Relay membership: admission control and invitation keys

pub mod admission;
pub mod invitation_key;

pub use admission::{
    AdmissionController, AdmissionError, CreatedRelay, ExpandedRelay, RelayExpand,
    MAX_OWNED_RELAYS,
};
pub use invitation_key::generate_invitation_key;
