use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_test_logger() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("valid default filter");

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(env_filter)
        .try_init();
}

/// Splits `items` into partitions of the given lengths, the last partition
/// taking whatever is left.
#[allow(dead_code)]
pub fn split<T: Clone>(items: &[T], lengths: &[usize]) -> Vec<Vec<T>> {
    let mut partitions = Vec::new();
    let mut rest = items;
    for length in lengths {
        let (head, tail) = rest.split_at((*length).min(rest.len()));
        partitions.push(head.to_vec());
        rest = tail;
    }
    partitions.push(rest.to_vec());
    partitions
}
