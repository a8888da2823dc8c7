//! Jump-host provisioning for hopbox
//!
//! Everything between "I have a private VM's address" and "there is a
//! disposable SSH jump host I can tunnel through" lives here:
//!
//! - [`VmLocator`] resolves a subscription, resource group and target IP
//!   into the network context a jump host must be provisioned into;
//! - [`JumpHost`] creates the four-resource chain (public address →
//!   security group → network interface → virtual machine), waits for it to
//!   run, and unwinds its rollback ledger in exact reverse order on
//!   disposal, failure or cancellation;
//! - [`Journal`] keeps a durable record of created resources so a crash
//!   mid-session does not lose track of billable leftovers.
//!
//! Console interaction and public-address discovery are injected through
//! the [`SelectionProvider`] and [`PublicAddressResolver`] traits.

pub mod cidr;
pub mod error;
pub mod journal;
pub mod jumphost;
pub mod locate;
pub mod myip;
pub mod select;

// Re-exports
pub use cidr::CidrBlock;
pub use error::{JumpError, Result};
pub use journal::{Journal, JournalRecord};
pub use jumphost::{JumpHost, LedgerEntry};
pub use locate::{SessionContext, VmLocator};
pub use myip::{IpifyResolver, PublicAddressResolver};
pub use select::SelectionProvider;
