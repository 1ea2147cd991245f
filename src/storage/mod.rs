pub mod session_store;

pub use session_store::{ACCESS_TOKEN_KEY, SESSION_KEY, SessionStore, USER_ID_KEY};
