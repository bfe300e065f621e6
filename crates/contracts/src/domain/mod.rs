pub mod a025_mp_returns;
