pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod coupon_usage;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod stock_movement;
pub mod webhook_event;

pub use cart::Entity as Cart;
pub use cart_item::Entity as CartItem;
pub use coupon::Entity as Coupon;
pub use coupon_usage::Entity as CouponUsage;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use payment::Entity as Payment;
pub use product::Entity as Product;
pub use stock_movement::Entity as StockMovement;
pub use webhook_event::Entity as WebhookEvent;
