/// Number of successful generations a session may run before it must be reset.
pub const MAX_REQUESTS: u32 = 5;

/// Decides whether a session that already completed `request_count`
/// generations may start another one.
pub fn allow(request_count: u32, max_requests: u32) -> bool {
    request_count < max_requests
}

pub fn remaining(request_count: u32, max_requests: u32) -> u32 {
    max_requests.saturating_sub(request_count)
}
