//! Attach typed values to objects you do not own.
//!
//! A [`SideTable`] maps an object's identity (its `Arc` allocation) plus an
//! [`AssociateKey`] to a value, without the object's type having a field for
//! it. The table holds owners weakly: associating a value never keeps an
//! object alive, and the values of a dropped object are released on the next
//! [`SideTable::prune`] (which also runs as new owners are added).
//!
//! ```
//! use std::sync::Arc;
//! use slotkit_associate::{AssociateKey, SideTable};
//!
//! struct Window;
//! const CLICKS: AssociateKey<u32> = AssociateKey::new("clicks");
//!
//! let table = SideTable::new();
//! let window = Arc::new(Window);
//! table.set(&window, &CLICKS, 3);
//! assert_eq!(table.get(&window, &CLICKS), Some(3));
//! ```

pub mod key;
pub mod table;

pub use key::AssociateKey;
pub use table::SideTable;
