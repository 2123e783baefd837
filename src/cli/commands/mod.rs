mod profile;
mod token;

pub use profile::{cmd_profile_set_disabled, cmd_profile_show};
pub use token::cmd_issue_token;
