mod cli;
mod infra;
mod routes;
mod server;

use college_admissions::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
