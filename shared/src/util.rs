/// Current UTC time in Unix milliseconds (the unit of `Order::created_at`)
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Minutes elapsed since `since_millis`, never negative
pub fn minutes_since(since_millis: i64) -> i64 {
    (now_millis() - since_millis).max(0) / 60_000
}
