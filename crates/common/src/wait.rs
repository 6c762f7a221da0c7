use std::time::Duration;

/// Poll `connect` until it succeeds or shutdown is requested.
///
/// Pipeline components start in arbitrary order, so a consumer may come up
/// before the segment it reads from exists. Returns `None` when the quit
/// flag was raised while still waiting.
pub fn wait_for_resource<F, T, E>(mut connect: F, poll: Duration, resource_name: &str) -> Option<T>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    loop {
        if crate::shutdown::requested() {
            tracing::info!("Shutdown requested while waiting for {}", resource_name);
            return None;
        }
        match connect() {
            Ok(resource) => {
                tracing::info!("{} connected", resource_name);
                return Some(resource);
            }
            Err(e) => {
                tracing::debug!("Waiting for {} ({})", resource_name, e);
                std::thread::sleep(poll);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_once_connect_succeeds() {
        let mut attempts = 0;
        let value = wait_for_resource(
            || {
                attempts += 1;
                if attempts < 3 {
                    Err("not yet")
                } else {
                    Ok(attempts)
                }
            },
            Duration::from_millis(1),
            "test resource",
        );
        assert_eq!(value, Some(3));
    }
}
