/// Session key holding the signed-in identity id.
pub const SESSION_USER_KEY: &str = "user_id";

/// Header carrying the debug bypass secret.
pub const DEBUG_BYPASS_HEADER: &str = "x-debug-bypass";

pub const ACCESS_EVENT_BUFFER: usize = 64;

pub mod intervals {
    use std::time::Duration;

    pub const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);
}

pub mod paths {
    pub const APP: &str = "/app";

    /// Where the protected page sends the viewer to start a quiz.
    pub const QUIZ: &str = "/";
}
