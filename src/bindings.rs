use alloy::sol;

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface KayenFactory {
        function feeTo() external view returns (address);
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }
);

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface KayenRouter02 {
        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);

        function addLiquidity(
            address tokenA,
            address tokenB,
            uint256 amountADesired,
            uint256 amountBDesired,
            uint256 amountAMin,
            uint256 amountBMin,
            address to,
            uint256 deadline
        ) external returns (uint256 amountA, uint256 amountB, uint256 liquidity);
    }
);

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface KayenPair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function kLast() external view returns (uint256);
        function getReserves()
            external
            view
            returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }
);

// Mock token from contracts/mocks/ERC20Mintable_decimal.sol; mint takes the amount first.
sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface ERC20Mintable {
        function mint(uint256 amount, address to) external;
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
    }
);

sol!(
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface ChilizWrapperFactory {
        function wrap(address account, address underlyingToken, uint256 amount)
            external
            returns (address wrappedToken);
    }
);
