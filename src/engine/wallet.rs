#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::CapitalPolicy;
use crate::errors::{Error, Result};

/// Account capital of a simulation.
///
/// Opening a position does not move the balance, it only commits part of it.
/// Realized profits and losses are the only thing that changes the balance.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    // Starting capital
    initial_balance: f64,
    // Realized capital
    balance: f64,
    // Capital tied up in open positions
    committed: f64,
    // Unrealized profit/loss from open positions
    unrealized_pnl: f64,
}

impl Wallet {
    /// Creates a new wallet with the given initial balance.
    /// Negative balances are rejected.
    pub fn new(balance: f64) -> Result<Self> {
        if balance <= 0.0 || !balance.is_finite() {
            return Err(Error::NegZeroBalance(balance));
        }

        Ok(Self {
            balance,
            committed: 0.0,
            unrealized_pnl: 0.0,
            initial_balance: balance,
        })
    }

    /// Returns the starting balance.
    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Returns the realized balance.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Returns the capital committed to open positions.
    pub fn committed(&self) -> f64 {
        self.committed
    }

    /// Returns the unrealized P&L of open positions, as last marked.
    pub fn unrealized_pnl(&self) -> f64 {
        self.unrealized_pnl
    }

    /// Returns the realized balance plus unrealized P&L.
    pub fn total_balance(&self) -> f64 {
        self.balance + self.unrealized_pnl
    }

    /// Returns the free balance (not committed to open positions). May be negative after losses.
    pub fn free_balance(&self) -> f64 {
        self.balance - self.committed
    }

    /// Returns the capital a new position may be sized from.
    pub fn available(&self, policy: CapitalPolicy) -> f64 {
        match policy {
            CapitalPolicy::Total => self.balance,
            CapitalPolicy::Free => self.free_balance(),
        }
    }

    /// Commits capital to a newly opened position.
    pub(crate) fn commit(&mut self, amount: f64) {
        self.committed += amount;
    }

    /// Releases the capital of a closed position and books its realized P&L.
    pub(crate) fn settle(&mut self, cost: f64, pnl: f64) -> Result<f64> {
        // tolerate float drift from repeated add/sub
        if cost - self.committed > 1e-9 * cost.max(1.0) {
            return Err(Error::ReleaseCapital(self.committed, cost));
        }
        self.committed = (self.committed - cost).max(0.0);
        self.balance += pnl;
        Ok(self.balance)
    }

    /// Updates the unrealized P&L.
    pub(crate) fn set_unrealized_pnl(&mut self, pnl: f64) {
        self.unrealized_pnl = pnl;
    }
}

#[cfg(test)]
#[test]
fn new_wallet_valid_balance() {
    let wallet = Wallet::new(100.0).unwrap();
    assert_eq!(wallet.balance(), 100.0);
    assert_eq!(wallet.free_balance(), 100.0);
    assert_eq!(wallet.committed, 0.0);
}

#[cfg(test)]
#[test]
fn new_wallet_invalid_balance() {
    let result = Wallet::new(0.0);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));

    let result = Wallet::new(-10.0);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));
}

#[cfg(test)]
#[test]
fn commit_and_settle_profit() {
    let mut wallet = Wallet::new(100.0).unwrap();

    wallet.commit(20.0);
    assert_eq!(wallet.balance, 100.0);
    assert_eq!(wallet.committed, 20.0);
    assert_eq!(wallet.free_balance(), 80.0);

    let balance = wallet.settle(20.0, 5.0).unwrap();
    assert_eq!(balance, 105.0);
    assert_eq!(wallet.committed, 0.0);
    assert_eq!(wallet.free_balance(), 105.0);
}

#[cfg(test)]
#[test]
fn commit_and_settle_loss() {
    let mut wallet = Wallet::new(100.0).unwrap();
    wallet.commit(20.0);
    wallet.settle(20.0, -5.0).unwrap();
    assert_eq!(wallet.balance, 95.0);
    assert_eq!(wallet.free_balance(), 95.0);
}

#[cfg(test)]
#[test]
fn settle_more_than_committed() {
    let mut wallet = Wallet::new(100.0).unwrap();
    wallet.commit(10.0);
    let result = wallet.settle(20.0, 0.0);
    assert!(matches!(result, Err(Error::ReleaseCapital(_, _))));
}

#[cfg(test)]
#[test]
fn available_by_policy() {
    let mut wallet = Wallet::new(100.0).unwrap();
    wallet.commit(30.0);
    assert_eq!(wallet.available(CapitalPolicy::Total), 100.0);
    assert_eq!(wallet.available(CapitalPolicy::Free), 70.0);
}

#[cfg(test)]
#[test]
fn unrealized_pnl() {
    let mut wallet = Wallet::new(100.0).unwrap();
    wallet.set_unrealized_pnl(10.0); // unrealized gain
    assert_eq!(wallet.unrealized_pnl, 10.0);
    assert_eq!(wallet.total_balance(), 110.0);
    assert_eq!(wallet.free_balance(), 100.0);

    wallet.set_unrealized_pnl(-5.0); // unrealized loss
    assert_eq!(wallet.total_balance(), 95.0);
}
