pub(crate) mod num_ext;
