//! Function surface of the multisig wallet contract.
//!
//! Only the calls the wallet service issues are declared here. Calldata and
//! return data use the standard Solidity ABI encoding.

use alloy_sol_types::sol;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IMultiSigWallet {
        function submitTransaction(address to, uint256 amount) external;
        function confirmTransaction(uint256 txIndex) external;
        function addOwner(address newOwner) external;
        function removeOwner(address owner) external;
        function getOwners() external view returns (address[] memory);
        function transactions(uint256 index)
            external
            view
            returns (address to, uint256 amount, bool executed, uint256 confirmations);
    }
}

pub use IMultiSigWallet::*;
