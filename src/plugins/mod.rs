pub mod arjun;
pub mod ffuf;
pub mod gowitness;
pub mod httpx_probe;
pub mod js_discovery;
pub mod portscan_naabu;
pub mod portscan_nmap;
pub mod registry;
pub mod subfinder;
pub mod types;
