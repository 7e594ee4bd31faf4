// Domain-layer modules and shared errors/models
pub mod derivation {
    pub use crate::derivation::*;
}

pub mod formatting {
    pub use crate::formatting::*;
}

pub mod reports {
    pub use crate::reports::*;
}

pub mod validation {
    pub use crate::validation::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod services {
    pub use crate::services::*;
}

pub mod errors {
    pub use crate::errors::*;
}
