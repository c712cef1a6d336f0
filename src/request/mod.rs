pub(crate) mod canonical;
pub(crate) mod model;
