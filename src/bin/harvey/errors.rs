use log::error;
use rocket::{http::Status, response::Responder, Request};
use thiserror::Error;

use harveylib::errors::HarveyError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Harvey Error {source:?}")]
    Harvey {
        #[from]
        source: HarveyError,
    },

    #[error("HTTP Error {0:?}")]
    HttpError(Status),
}

impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        error!("Error: {}", self);

        match self {
            Self::HttpError(status) => status.respond_to(req),
            _ => Status::InternalServerError.respond_to(req),
        }
    }
}
