pub mod assistant;
pub mod cart;
pub mod clock;
pub mod domain;
pub mod ports;
pub mod recurrence;
pub mod scheduler;
pub mod store;

pub use assistant::{Assistant, CompletionChain, RecipeRequest, VendorQuery};
pub use cart::{AddOutcome, Cart, CartError, CartItem, CartItemUpdate, CartLine, LineUpdate, Order};
pub use clock::{ManualClock, SystemClock};
pub use domain::{
    AuthSession, Frequency, Recipe, RecurrenceRule, Reminder, ReminderDraft, ReminderPatch,
    ReminderType, SavedRecipe, User, UserCredentials, UserPreferences, ValidationError,
    VendorRecommendation,
};
pub use ports::{
    BlobStorage, Clock, CompletionRequest, CompletionService, DatabaseService, NotificationSink,
    PortError, PortResult,
};
pub use recurrence::{next_occurrence, CatchUp};
pub use scheduler::{
    snooze_length, snooze_until, LeadTime, Notification, NotificationAction, NotificationScheduler,
    ReminderNotifier,
};
pub use store::{Completion, ReminderStore};
