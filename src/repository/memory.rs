//! In-memory ledger store.
//!
//! A transaction holds the store's lock for its whole lifetime and works on a copy
//! of the tables; `commit` swaps the copy in. Transactions are therefore fully
//! serialized, and a transaction dropped before commit leaves no trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::ledger::{LedgerStore, LedgerTx};
use crate::{
    error::AppResult,
    models::{
        book::Book,
        loan::{Loan, LoanStatus, NewLoan},
        user::User,
    },
};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    books: BTreeMap<i64, Book>,
    loans: BTreeMap<i64, Loan>,
    next_loan_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    pub async fn put_book(&self, book: Book) {
        self.tables.lock().await.books.insert(book.id, book);
    }

    /// Seed or overwrite a loan row directly
    pub async fn put_loan(&self, loan: Loan) {
        let mut tables = self.tables.lock().await;
        tables.next_loan_id = tables.next_loan_id.max(loan.id);
        tables.loans.insert(loan.id, loan);
    }

    pub async fn book(&self, id: i64) -> Option<Book> {
        self.tables.lock().await.books.get(&id).cloned()
    }

    pub async fn loan(&self, id: i64) -> Option<Loan> {
        self.tables.lock().await.loans.get(&id).cloned()
    }

    pub async fn loans(&self) -> Vec<Loan> {
        self.tables.lock().await.loans.values().cloned().collect()
    }

    pub async fn books(&self) -> Vec<Book> {
        self.tables.lock().await.books.values().cloned().collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let work = (*guard).clone();
        Ok(Box::new(MemoryLedgerTx { guard, work }))
    }
}

pub struct MemoryLedgerTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn user_for_update(&mut self, id: i64) -> AppResult<Option<User>> {
        Ok(self.work.users.get(&id).cloned())
    }

    async fn book_for_update(&mut self, id: i64) -> AppResult<Option<Book>> {
        Ok(self.work.books.get(&id).cloned())
    }

    async fn loan_for_update(&mut self, id: i64) -> AppResult<Option<Loan>> {
        Ok(self.work.loans.get(&id).cloned())
    }

    async fn count_user_loans(&mut self, user_id: i64, status: LoanStatus) -> AppResult<i64> {
        let count = self
            .work
            .loans
            .values()
            .filter(|l| l.user_id == user_id && l.status == status)
            .count();
        Ok(count as i64)
    }

    async fn has_open_loan(&mut self, user_id: i64, book_id: i64) -> AppResult<bool> {
        Ok(self
            .work
            .loans
            .values()
            .any(|l| l.user_id == user_id && l.book_id == book_id && l.status.is_open()))
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        self.work.next_loan_id += 1;
        let created = Loan {
            id: self.work.next_loan_id,
            user_id: loan.user_id,
            book_id: loan.book_id,
            loan_date: loan.loan_date,
            due_date: loan.due_date,
            return_date: None,
            status: LoanStatus::Active,
            fine: Decimal::ZERO,
            notes: loan.notes.clone(),
        };
        self.work.loans.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()> {
        self.work.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn update_book_copies(&mut self, book: &Book) -> AppResult<()> {
        if let Some(stored) = self.work.books.get_mut(&book.id) {
            stored.total_copies = book.total_copies;
            stored.available_copies = book.available_copies;
        }
        Ok(())
    }

    async fn active_past_due_for_update(&mut self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        Ok(self
            .work
            .loans
            .values()
            .filter(|l| l.status == LoanStatus::Active && l.due_date < now)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryLedgerTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn new_loan() -> NewLoan {
        NewLoan {
            user_id: 1,
            book_id: 1,
            loan_date: now(),
            due_date: now() + chrono::Duration::days(14),
            notes: None,
        }
    }

    #[test]
    fn test_uncommitted_writes_are_discarded() {
        tokio_test::block_on(async {
            let store = MemoryLedgerStore::new();
            {
                let mut tx = store.begin().await.unwrap();
                tx.insert_loan(&new_loan()).await.unwrap();
            }
            assert!(store.loans().await.is_empty());
        });
    }

    #[test]
    fn test_commit_publishes_writes() {
        tokio_test::block_on(async {
            let store = MemoryLedgerStore::new();
            let mut tx = store.begin().await.unwrap();
            let loan = tx.insert_loan(&new_loan()).await.unwrap();
            assert!(tx.has_open_loan(1, 1).await.unwrap());
            tx.commit().await.unwrap();

            assert_eq!(store.loan(loan.id).await, Some(loan));
            let mut tx = store.begin().await.unwrap();
            assert_eq!(tx.count_user_loans(1, LoanStatus::Active).await.unwrap(), 1);
            assert!(tx.active_past_due_for_update(now()).await.unwrap().is_empty());
        });
    }
}
