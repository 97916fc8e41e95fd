//! Memory system (spec §4.4): episodic, semantic, procedural, and working
//! memory unified behind `MemorySystem`, built on `aegis_vector` for
//! semantic search and `aegis_crypto` for durable persistence.

mod episodic;
mod procedural;
mod semantic;
mod system;
mod working;

pub use episodic::{EpisodicRecord, EpisodicStore};
pub use procedural::{ProcedureFn, ProcedureRecord, ProceduralStore};
pub use semantic::SemanticStore;
pub use system::{
    MemoryKind, MemoryStatistics, MemoryStoreInput, MemoryStoreOutput, MemorySystem, RetrievalHit, RetrievalQuery,
};
pub use working::{WorkingItem, WorkingStore};
