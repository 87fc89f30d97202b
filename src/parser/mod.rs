pub mod token_inspector;
