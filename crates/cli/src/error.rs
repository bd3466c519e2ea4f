use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("resource command failed")]
    Resource,
    #[display("collection command failed")]
    Collection,
    #[display("could not start the async runtime")]
    Runtime,
    #[display("could not write output")]
    Output,
}
