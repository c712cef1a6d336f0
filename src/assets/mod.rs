pub(crate) mod decode;
pub(crate) mod fetch;
pub(crate) mod index_map;
pub(crate) mod ingredients;
pub(crate) mod layout;
pub(crate) mod npy;
