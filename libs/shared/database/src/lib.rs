pub mod postgres;
pub mod redis_pool;
pub mod supabase;

pub use supabase::SupabaseClient;
