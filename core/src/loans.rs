//! `/prestamos` endpoints.

use crate::client::{ApiClient, RequestOptions};
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::types::{Loan, MessageResponse, NewLoan};

#[derive(Debug, Clone, Copy)]
pub struct LoansApi<'a> {
    client: &'a ApiClient,
}

impl<'a> LoansApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub fn list(&self) -> Result<Vec<Loan>, ApiError> {
        self.client
            .execute_as(HttpMethod::Get, "/prestamos/", RequestOptions::new())
    }

    /// Loans not yet returned (`ACTIVO` or `VENCIDO`).
    pub fn active(&self) -> Result<Vec<Loan>, ApiError> {
        self.client
            .execute_as(HttpMethod::Get, "/prestamos/activos", RequestOptions::new())
    }

    pub fn overdue(&self) -> Result<Vec<Loan>, ApiError> {
        self.client
            .execute_as(HttpMethod::Get, "/prestamos/vencidos", RequestOptions::new())
    }

    pub fn by_user(&self, user_id: i64) -> Result<Vec<Loan>, ApiError> {
        self.client.execute_as(
            HttpMethod::Get,
            &format!("/prestamos/usuario/{user_id}"),
            RequestOptions::new(),
        )
    }

    pub fn create(&self, loan: &NewLoan) -> Result<MessageResponse, ApiError> {
        self.client
            .execute_as(HttpMethod::Post, "/prestamos/", RequestOptions::json(loan)?)
    }

    pub fn mark_returned(&self, id: i64) -> Result<MessageResponse, ApiError> {
        self.client.execute_as(
            HttpMethod::Put,
            &format!("/prestamos/{id}/devolver"),
            RequestOptions::new(),
        )
    }
}
