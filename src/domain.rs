pub mod user_email;
pub mod verification_code;
