pub use tessera_query::*;
pub use {
    tessera_dtype as dtype, tessera_error as error, tessera_schema as schema,
};
