mod maintenance;
mod planning;
mod search;
mod sorting;
mod suggestions;
mod variants;
