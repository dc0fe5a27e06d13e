pub(crate) mod plan;
pub(crate) mod simulate;
pub(crate) mod validate;

pub(crate) use plan::plan;
pub(crate) use simulate::simulate;
pub(crate) use validate::validate;
