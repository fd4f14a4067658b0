mod support;

#[cfg(feature = "redis-tokio")]
mod test_redis_counter;
