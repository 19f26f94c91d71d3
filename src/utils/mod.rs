pub mod logger;
 