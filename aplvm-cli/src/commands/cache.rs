use aplvm_core::cache::ModelCache;

use crate::args::{CacheArgs, CacheCommand};
use crate::exit_codes::SUCCESS;

pub fn run(args: CacheArgs) -> anyhow::Result<i32> {
    match args.cmd {
        CacheCommand::Stats { sandbox } => {
            let cache = ModelCache::new(&sandbox)?;
            let stats = cache.stats()?;
            println!("total_cached_calls: {}", stats.total_cached_calls);
            println!("cache_size_bytes:   {}", stats.cache_size_bytes);
            println!("cache_hit_rate:     {:.2}%", stats.cache_hit_rate);
            Ok(SUCCESS)
        }
    }
}
