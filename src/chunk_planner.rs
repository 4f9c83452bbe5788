use crate::error::StatsError;
use crate::rpc_pool::Endpoint;
use crate::types::Chunk;

/// Splits `[from_block, to_block]` into consecutive chunks of at most
/// `max_span` blocks. Chunk `i` tries the endpoints rotated left by `i mod n`,
/// so each endpoint is first choice for an equal share of chunks.
pub fn plan_chunks(
    from_block: u64,
    to_block: u64,
    max_span: u64,
    endpoints: &[Endpoint],
) -> Result<Vec<Chunk>, StatsError> {
    if from_block > to_block {
        return Err(StatsError::Config(format!(
            "start block {} is after end block {}",
            from_block, to_block
        )));
    }
    if max_span == 0 {
        return Err(StatsError::Config("chunk span must be > 0".to_string()));
    }
    if endpoints.is_empty() {
        return Err(StatsError::Config(
            "cannot plan chunks without endpoints".to_string(),
        ));
    }

    let mut chunks = Vec::new();
    let mut current_from = from_block;
    loop {
        let current_to = current_from.saturating_add(max_span - 1).min(to_block);
        let index = chunks.len();
        chunks.push(Chunk {
            index,
            from: current_from,
            to: current_to,
            endpoints: rotated(endpoints, index),
        });
        if current_to == to_block {
            break;
        }
        current_from = current_to + 1;
    }
    Ok(chunks)
}

fn rotated(endpoints: &[Endpoint], index: usize) -> Vec<Endpoint> {
    let offset = index % endpoints.len();
    endpoints[offset..]
        .iter()
        .chain(&endpoints[..offset])
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{endpoint, ScriptedClient};
    use std::sync::Arc;

    fn endpoints(n: usize) -> Vec<Endpoint> {
        (0..n)
            .map(|i| endpoint(&format!("http://rpc{}", i), Arc::new(ScriptedClient::ok(vec![]))))
            .collect()
    }

    fn urls(chunk: &Chunk) -> Vec<&str> {
        chunk.endpoints.iter().map(|e| e.url.as_str()).collect()
    }

    #[test]
    fn test_chunks_partition_range_exactly() {
        let eps = endpoints(1);
        for start in 0..20u64 {
            for end in start..start + 40 {
                for span in 1..12u64 {
                    let chunks = plan_chunks(start, end, span, &eps).unwrap();
                    assert_eq!(chunks[0].from, start);
                    assert_eq!(chunks.last().unwrap().to, end);
                    for pair in chunks.windows(2) {
                        assert_eq!(pair[0].to + 1, pair[1].from);
                    }
                    for (i, c) in chunks.iter().enumerate() {
                        assert_eq!(c.index, i);
                        assert!(c.from <= c.to);
                        assert!(c.span() <= span);
                        assert!(c.to <= end);
                    }
                }
            }
        }
    }

    #[test]
    fn test_single_block_range() {
        let chunks = plan_chunks(42, 42, 500, &endpoints(2)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].from, chunks[0].to), (42, 42));
    }

    #[test]
    fn test_no_overflow_at_top_of_range() {
        let chunks = plan_chunks(u64::MAX - 5, u64::MAX, 4, &endpoints(1)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].to, u64::MAX);
    }

    #[test]
    fn test_endpoint_rotation() {
        let eps = endpoints(3);
        let chunks = plan_chunks(0, 999, 100, &eps).unwrap();
        assert_eq!(chunks.len(), 10);
        for chunk in &chunks {
            assert_eq!(chunk.endpoints[0].url, eps[chunk.index % 3].url);
            assert_eq!(chunk.endpoints.len(), 3);
        }
        assert_eq!(urls(&chunks[1]), ["http://rpc1", "http://rpc2", "http://rpc0"]);
        assert_eq!(urls(&chunks[2]), ["http://rpc2", "http://rpc0", "http://rpc1"]);
    }

    #[test]
    fn test_invalid_input_is_config_error() {
        assert!(matches!(
            plan_chunks(10, 5, 100, &endpoints(1)),
            Err(StatsError::Config(_))
        ));
        assert!(matches!(plan_chunks(0, 5, 100, &[]), Err(StatsError::Config(_))));
        assert!(matches!(
            plan_chunks(0, 5, 0, &endpoints(1)),
            Err(StatsError::Config(_))
        ));
    }
}
