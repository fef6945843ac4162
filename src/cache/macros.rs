/// Read-through caching for [`ResultCache`](crate::cache::ResultCache).
///
/// Returns the cached value when present. Otherwise awaits `$block`, queues
/// the computed value for the background writer and returns it. A failing
/// cache read is logged and treated as a miss; errors from `$block` propagate.
///
/// # Arguments
/// * `$cache`: cache exposing `get_from_cache` and `set_in_background`.
/// * `$key`: the [`CacheKey`](crate::cache::CacheKey) to read and write.
/// * `$ttl`: a `std::time::Duration`.
/// * `$block`: future computing an `AppResult` of the value on a miss.
///
/// # Example
/// ```rust,ignore
/// let similar: Vec<Recommendation> = cached!(cache, key, ttl, async {
///     compute_similar(movie_id).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache.get_from_cache(&$key).await {
            Ok(Some(cached)) => Ok(cached),
            outcome => {
                if let Err(e) = outcome {
                    tracing::warn!(error = %e, key = %$key, "Cache read failed, recomputing");
                }
                match $block.await {
                    Ok(value) => {
                        $cache.set_in_background(&$key, &value, $ttl);
                        Ok(value)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }};
}
