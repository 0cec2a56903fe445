pub mod clock;
pub mod ids;
pub mod models;
pub mod quickes;
pub mod routing;

pub use models::{
	Category, ChangeEvent, ChangeOp, EntityType, GlobalCategory, NewChange, Statement, Template,
	UserState,
};
