mod common;
mod lookup;
mod routing;
