//! Groups and member encodings

pub mod entity;
pub mod membership;

use crate::principal::Principals;

pub use entity::Group;
pub use membership::{member_attribute, member_format, MemberFormat, Membership, PLACEHOLDER_MEMBER};

pub type Groups = Principals<Group>;
