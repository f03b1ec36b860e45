pub mod factory;

pub use factory::{generate_bot_profile, generate_user_profile, BotProfile, UserProfile};
