pub use cancel_token::*;
pub use health_flag::*;
pub use state::*;

mod cancel_token;
mod health_flag;
pub mod logger;
pub mod params_io;
mod state;
