use serde::{Deserialize, Serialize};

/// `{}`: the result of `ping`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyResult {}
