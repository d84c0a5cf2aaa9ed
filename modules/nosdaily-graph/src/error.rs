use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("graph query failed: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("unexpected graph row: {0}")]
    Row(String),

    #[error("graph store unavailable: {0}")]
    Unavailable(String),
}
