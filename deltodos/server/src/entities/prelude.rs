pub use super::todo::Entity as Todo;
