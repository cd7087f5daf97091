//! Contract bindings for the Polynomial perps market and its fxUSD
//! collateral token, generated from the venue's call surface.

use ethers::contract::abigen;

abigen!(
    PerpsMarket,
    r#"[
        struct OrderCommitmentData { uint128 marketId; uint128 accountId; int128 sizeDelta; uint128 settlementStrategyId; uint256 acceptablePrice; bytes32 trackingCode; address referrer; }
        function createAccount() external returns (uint128)
        event AccountCreated(uint128 indexed accountId, address indexed owner)
        function modifyCollateral(uint128 accountId, uint128 collateralId, int256 amountDelta) external
        function getAccountOpenPositions(uint128 accountId) external view returns (uint256[] memory)
        function getMarkets() external view returns (uint256[] memory marketIds)
        function metadata(uint128 marketId) external view returns (string memory name, string memory symbol)
        function getAvailableMargin(uint128 accountId) external view returns (int256 availableMargin)
        function requiredMarginForOrder(uint128 marketId, uint128 accountId, int128 sizeDelta) external view returns (uint256 requiredMargin)
        function getOpenPosition(uint128 accountId, uint128 marketId) external view returns (int256 totalPnl, int256 accruedFunding, int128 positionSize, uint256 owedInterest)
        function commitOrder(OrderCommitmentData commitment) external returns (uint256 fees)
        function getOrder(uint128 accountId) external view returns (OrderCommitmentData order)
    ]"#
);

abigen!(
    FxUsd,
    r#"[
        function approve(address spender, uint256 amount) public returns (bool)
    ]"#
);
