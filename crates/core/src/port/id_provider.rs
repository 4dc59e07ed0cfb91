// ID Provider Port
//
// Lead and job IDs are generated here rather than inside the domain so tests
// can use predictable IDs (see `mocks::SequentialIdProvider`).

pub trait IdProvider: Send + Sync {
    fn generate_id(&self) -> String;
}

/// Random UUID v4 IDs (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
