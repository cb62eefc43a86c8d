mod adapter;
mod mock;
mod status;
