//! ABI bindings for the ERC-4337 contracts the dispatcher talks to

use alloy_sol_types::sol;

sol! {
    /// SimpleAccount entry used to wrap every target call
    interface ISimpleAccount {
        function execute(address dest, uint256 value, bytes calldata func) external;
    }

    /// SimpleAccountFactory (v0.6)
    interface ISimpleAccountFactory {
        function createAccount(address owner, uint256 salt) external returns (address ret);
        function getAddress(address owner, uint256 salt) external view returns (address);
    }

    /// EntryPoint v0.6 nonce manager
    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}
