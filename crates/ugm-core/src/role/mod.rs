pub mod entity;

use crate::principal::Principals;

pub use entity::Role;

pub type Roles = Principals<Role>;
